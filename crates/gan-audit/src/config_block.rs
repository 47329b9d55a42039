use gan_core::{ContextScope, Diagnostic, GanError};
use serde::Deserialize;

fn default_threshold() -> u8 {
    85
}

fn default_max_cycles() -> u32 {
    25
}

/// The inline ```` ```config ```` block grammar (§4.D.1). Deserialized with
/// `deny_unknown_fields` so a typo'd key is a validation error, not a silent no-op.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct InlineAuditConfig {
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub scope: ContextScope,
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default)]
    pub judges: Vec<String>,
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,
}

impl Default for InlineAuditConfig {
    fn default() -> Self {
        InlineAuditConfig {
            task: None,
            scope: ContextScope::default(),
            threshold: default_threshold(),
            judges: Vec::new(),
            max_cycles: default_max_cycles(),
        }
    }
}

/// Find a fenced ```` ```config\n...\n``` ```` block and parse its body as TOML. Returns
/// `Ok(None)` when no such block is present (all defaults apply); a present-but-malformed
/// block (bad TOML, unknown key) is a validation error, never a silent fallback.
pub fn extract_inline_config(text: &str) -> Result<Option<InlineAuditConfig>, Diagnostic> {
    let Some(start) = text.find("```config") else {
        return Ok(None);
    };
    let body_start = match text[start..].find('\n') {
        Some(offset) => start + offset + 1,
        None => return Ok(None),
    };
    let Some(end_offset) = text[body_start..].find("```") else {
        return Err(GanError::Validation("unterminated ```config fenced block".into()).into());
    };
    let body = &text[body_start..body_start + end_offset];

    toml::from_str(body)
        .map(Some)
        .map_err(|e| Diagnostic::from(GanError::Validation(format!("invalid inline config block: {e}"))))
}
