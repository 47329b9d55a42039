//! Shared data model and error types for the audit server.
//!
//! Every wire-facing and on-disk type lives here so that `gan-env`, `gan-process`,
//! `gan-audit`, `gan-session`, `gan-eval`, `gan-feedback` and `gan-server` all agree on one
//! shape without depending on each other.

pub mod error;
pub mod types;

pub use error::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, GanError};
pub use types::*;
