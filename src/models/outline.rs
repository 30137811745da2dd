//! Outline API request/response models.

use serde::{Deserialize, Serialize};

/// Standard Outline response envelope: `{"data": ...}`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// An Outline collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// An Outline document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub collection_id: String,
    #[serde(default)]
    pub parent_document_id: Option<String>,
    #[serde(default)]
    pub url: String,
}

/// An Outline attachment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub url: String,
    pub name: String,
    pub size: u64,
}

/// Response of `attachments.create`: a presigned upload target plus the
/// attachment record that will exist once the upload completes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentUpload {
    pub upload_url: String,
    #[serde(default)]
    pub form: serde_json::Map<String, serde_json::Value>,
    pub attachment: Attachment,
}
