//! Per-run result reporting structures.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final state of one migrated document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Created with all referenced attachments uploaded
    Created,
    /// Created, but one or more attachments failed to upload
    CreatedWithAttachmentFailures,
    /// The document itself could not be created
    Failed,
    /// Never attempted because the run deadline was reached
    Skipped,
}

/// One attachment that could not be migrated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentFailure {
    /// Reference path from the document body
    pub path: String,
    /// Human-readable failure reason
    pub reason: String,
}

/// Outcome record for a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub source_id: String,
    pub title: String,
    pub status: DocumentStatus,
    /// Identifier assigned by Outline, when the document was created
    pub destination_id: Option<String>,
    /// Failure detail for `Failed`/`Skipped` documents
    pub error: Option<String>,
    pub attachment_failures: Vec<AttachmentFailure>,
}

/// Aggregate counters for one migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStats {
    pub documents_created: usize,
    pub attachments_uploaded: usize,
    pub total_attachment_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Everything a run produces: the destination collection, the
/// source-to-destination id mapping, and per-document outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub collection_id: String,
    pub mapping: HashMap<String, String>,
    pub outcomes: Vec<DocumentOutcome>,
    pub stats: MigrationStats,
}

impl MigrationReport {
    /// Documents that were not fully migrated.
    pub fn failures(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status != DocumentStatus::Created)
    }

    /// True when any document failed, was skipped, or lost attachments.
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}
