// src/lib.rs

//! Docport Library
//!
//! Migrates a Docmost ZIP export into an Outline instance while preserving
//! document hierarchy and attachments.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;
