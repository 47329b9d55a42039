//! Structured Feedback Builder (§4.J): a pure function from an [`gan_core::AuditReview`] and
//! iteration history to a sanitized [`FeedbackDocument`].

mod document;
mod sanitize;

pub use document::{build_feedback, EvidenceRow, FeedbackDocument, RiskLevel, TraceabilityRow};
pub use sanitize::sanitize;
