use serde::{Deserialize, Serialize};

/// The taxonomy of failure categories a [`Diagnostic`] may carry, per the error-handling
/// design: installation failures are fatal at startup, everything else is per-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticCategory {
    Installation,
    Environment,
    Process,
    Timeout,
    Permission,
    Parse,
    Validation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Critical,
    Error,
    Warning,
}

/// The typed error payload that crosses component boundaries and the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub details: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub documentation_links: Vec<String>,
}

/// The internal enum components match on; converts into the wire-level [`Diagnostic`] at a
/// component boundary. Split the same way this codebase splits "the enum the program branches
/// on" from "the struct serialized to callers".
#[derive(thiserror::Error, Debug)]
pub enum GanError {
    #[error("external CLI not usable: {0}")]
    Installation(String),

    #[error("environment error: {0}")]
    Environment(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("subprocess timed out after {0}ms")]
    Timeout(u64),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("failed to parse subprocess output: {0}")]
    Parse(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl GanError {
    pub fn category(&self) -> DiagnosticCategory {
        match self {
            GanError::Installation(_) => DiagnosticCategory::Installation,
            GanError::Environment(_) => DiagnosticCategory::Environment,
            GanError::Process(_) => DiagnosticCategory::Process,
            GanError::Timeout(_) => DiagnosticCategory::Timeout,
            GanError::Permission(_) => DiagnosticCategory::Permission,
            GanError::Parse(_) => DiagnosticCategory::Parse,
            GanError::Validation(_) => DiagnosticCategory::Validation,
        }
    }

    /// Default suggestions/links per category, attached unless the caller supplies its own
    /// via [`Diagnostic::with_suggestions`].
    fn default_suggestions(&self) -> Vec<String> {
        match self.category() {
            DiagnosticCategory::Installation => vec![
                "Verify the configured executable path is correct".into(),
                "Install or upgrade the external code-analysis CLI".into(),
            ],
            DiagnosticCategory::Environment => {
                vec!["Check the working-directory hint and repository layout".into()]
            }
            DiagnosticCategory::Process => {
                vec!["Inspect subprocess stderr for the underlying failure".into()]
            }
            DiagnosticCategory::Timeout => {
                vec!["Increase auditTimeoutMs or simplify the candidate".into()]
            }
            DiagnosticCategory::Permission => {
                vec!["Check file permissions on the configured executable".into()]
            }
            DiagnosticCategory::Parse => {
                vec!["The external CLI must emit a single strict JSON object on stdout".into()]
            }
            DiagnosticCategory::Validation => {
                vec!["Check the request against the documented schema".into()]
            }
        }
    }

    fn severity(&self) -> DiagnosticSeverity {
        match self {
            GanError::Installation(_) => DiagnosticSeverity::Critical,
            _ => DiagnosticSeverity::Error,
        }
    }
}

impl From<GanError> for Diagnostic {
    fn from(err: GanError) -> Self {
        let suggestions = err.default_suggestions();
        let severity = err.severity();
        let category = err.category();
        Diagnostic {
            category,
            severity,
            message: err.to_string(),
            details: String::new(),
            suggestions,
            documentation_links: Vec::new(),
        }
    }
}

impl Diagnostic {
    /// Attach the first `limit` bytes of `raw` as `details`, used by the Audit Engine when
    /// attaching subprocess output to a parse diagnostic (§4.D.5: "first 2 KiB of stdout").
    pub fn with_details_truncated(mut self, raw: &str, limit: usize) -> Self {
        self.details = raw.chars().take(limit).collect();
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}
