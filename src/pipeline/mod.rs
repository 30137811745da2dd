//! Pipeline entry point for the migration run.

pub mod migrate;

pub use migrate::run_migration;
