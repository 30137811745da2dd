// src/services/mod.rs

//! Core migration services.
//!
//! - `archive`: reads the Docmost export ZIP
//! - `tree`: reconstructs the document hierarchy
//! - `transform`: rewrites document content for Outline
//! - `outline`: rate-limited Outline API client
//! - `retry`: retry state machine driving the client

pub mod archive;
pub mod outline;
pub mod retry;
pub mod transform;
pub mod tree;

pub use archive::{DocmostExport, ExportArchive};
pub use outline::{OutlineApi, OutlineClient, RateBudget};
pub use transform::{TransformOutcome, resolve_attachment_urls, transform_content};
pub use tree::{PageNode, build_tree};
