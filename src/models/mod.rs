// src/models/mod.rs

//! Domain models for the migration application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod document;
mod outline;
mod report;

// Re-export all public types
pub use config::{ClientConfig, Config, MigrationConfig};
pub use document::{SourceAttachment, SourcePage};
pub use outline::{Attachment, AttachmentUpload, Collection, Document, Envelope};
pub use report::{
    AttachmentFailure, DocumentOutcome, DocumentStatus, MigrationReport, MigrationStats,
};
