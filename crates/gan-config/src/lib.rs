//! Typed configuration for the audit server (§6.4). Read once at startup into an
//! `Arc<GanConfig>`; no component re-reads the file.

mod config;

pub use config::{CompletionTierConfig, GanConfig};
