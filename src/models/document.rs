//! Source export data structures.

use serde::{Deserialize, Serialize};

/// One document extracted from the Docmost export archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourcePage {
    /// Identifier unique within the archive (root-relative path of the
    /// markdown file, e.g. `Guides/Setup.md`)
    pub source_id: String,

    /// Display title (the file stem; slashes in the original title are
    /// lost on export, an accepted limitation)
    pub title: String,

    /// Raw markdown content
    pub content: String,

    /// Parent derived from directory nesting: a page at `A/B/page.md` has
    /// `A/B.md` as its parent hint
    pub dir_parent: Option<String>,

    /// Parent declared by embedded metadata, when the export format
    /// provides one. Directory nesting wins when the two disagree.
    pub declared_parent: Option<String>,
}

/// One attachment file found in the export archive.
///
/// Attachments are owned by the archive; a page only references them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceAttachment {
    /// Root-relative path (e.g. `files/<uuid>/photo.png`)
    pub path: String,

    /// Full entry name inside the ZIP, used to read the bytes back
    pub entry_name: String,

    /// Uncompressed size in bytes
    pub size: u64,
}

impl SourceAttachment {
    /// File name portion of the attachment path.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}
