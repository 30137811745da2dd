//! Docmost export archive reader.
//!
//! Opens the export ZIP in memory and enumerates documents (markdown files)
//! and attachments (anything under a `files/` directory). Reading is
//! deterministic: the same archive bytes always produce the same records
//! in the same order.

use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::path::Path;

use zip::ZipArchive;

use crate::error::{AppError, Result};
use crate::models::{SourceAttachment, SourcePage};

/// Parsed view of one export: the space name plus every document and
/// attachment, in archive enumeration order.
#[derive(Debug, Clone)]
pub struct DocmostExport {
    pub space_name: String,
    pub pages: Vec<SourcePage>,
    pub attachments: Vec<SourceAttachment>,
}

impl DocmostExport {
    /// Resolve a markdown attachment reference (`files/<uuid>/<name>`,
    /// possibly with leading slashes) to an archive record.
    ///
    /// Tries the root-relative path first, then falls back to matching the
    /// `files/<uuid>/` segment anywhere in the archive, since some exports
    /// nest the files directory under the referencing page's folder.
    pub fn find_attachment(&self, ref_path: &str) -> Option<&SourceAttachment> {
        let clean = ref_path.trim_start_matches('/');
        if let Some(found) = self.attachments.iter().find(|a| a.path == clean) {
            return Some(found);
        }

        let mut parts = clean.split('/');
        let (first, uuid) = (parts.next()?, parts.next()?);
        if first != "files" {
            return None;
        }
        let needle = format!("files/{uuid}/");
        self.attachments
            .iter()
            .find(|a| a.path.contains(&needle) || a.path.starts_with(&needle))
    }
}

/// Reader over a Docmost export ZIP.
pub struct ExportArchive {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    root_prefix: String,
    space_name: String,
}

impl ExportArchive {
    /// Open an export ZIP from disk.
    ///
    /// Determines the archive root: exports with a single top-level
    /// directory use that directory as the space root and name; otherwise
    /// entries live at the archive root and the ZIP file stem names the
    /// space.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| AppError::archive(format!("cannot read {}: {e}", path.display())))?;
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| AppError::archive(format!("not a valid ZIP archive: {e}")))?;

        let names: Vec<&str> = archive.file_names().collect();
        let tops: HashSet<&str> = names
            .iter()
            .filter_map(|n| n.split('/').next())
            .collect();
        let rooted = names.iter().all(|n| n.contains('/'));

        let (root_prefix, space_name) = if rooted && tops.len() == 1 {
            let top = tops.into_iter().next().unwrap_or_default();
            (format!("{top}/"), top.to_string())
        } else {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Imported".to_string());
            (String::new(), stem)
        };

        Ok(Self {
            archive,
            root_prefix,
            space_name,
        })
    }

    /// Space name derived from the archive layout.
    pub fn space_name(&self) -> &str {
        &self.space_name
    }

    /// Enumerate every document and attachment in the archive.
    ///
    /// Fails with an archive error when the export contains no documents,
    /// since that means the package is not a recognizable export.
    pub fn parse(&mut self) -> Result<DocmostExport> {
        let mut pages = Vec::new();
        let mut attachments = Vec::new();

        for index in 0..self.archive.len() {
            let mut entry = self.archive.by_index(index)?;
            if !entry.is_file() {
                continue;
            }
            let entry_name = entry.name().to_string();
            let Some(rel) = entry_name.strip_prefix(&self.root_prefix) else {
                continue;
            };
            let rel = rel.to_string();

            if rel.split('/').any(|part| part == "files") {
                attachments.push(SourceAttachment {
                    path: rel,
                    entry_name,
                    size: entry.size(),
                });
                continue;
            }

            if !rel.ends_with(".md") {
                continue;
            }

            let mut content = String::new();
            entry.read_to_string(&mut content).map_err(|e| {
                AppError::archive(format!("document {rel} is not valid UTF-8: {e}"))
            })?;

            pages.push(SourcePage {
                title: page_title(&rel),
                dir_parent: dir_parent(&rel),
                declared_parent: None,
                source_id: rel,
                content,
            });
        }

        if pages.is_empty() {
            return Err(AppError::archive(
                "no documents found in export (expected .md files)",
            ));
        }

        Ok(DocmostExport {
            space_name: self.space_name.clone(),
            pages,
            attachments,
        })
    }

    /// Read the raw bytes of one archive entry.
    pub fn read_bytes(&mut self, entry_name: &str) -> Result<Vec<u8>> {
        let mut entry = self.archive.by_name(entry_name)?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Title of a page: the file stem of the last path component.
fn page_title(rel_path: &str) -> String {
    let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
    name.strip_suffix(".md").unwrap_or(name).to_string()
}

/// Directory-derived parent hint: a page at `A/B/page.md` is a child of
/// the page exported as `A/B.md`.
fn dir_parent(rel_path: &str) -> Option<String> {
    let dir = rel_path.rsplit_once('/')?.0;
    Some(format!("{dir}.md"))
}
