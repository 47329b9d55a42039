use anyhow::{Context, Result};
use gan_core::CompletionTier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionTierConfig {
    pub name: String,
    pub score_threshold: u8,
    pub iteration_threshold: u32,
}

impl From<CompletionTierConfig> for CompletionTier {
    fn from(t: CompletionTierConfig) -> Self {
        CompletionTier {
            name: t.name,
            score_threshold: t.score_threshold,
            iteration_threshold: t.iteration_threshold,
        }
    }
}

fn default_completion_tiers() -> Vec<CompletionTierConfig> {
    gan_core::default_tiers()
        .into_iter()
        .map(|t| CompletionTierConfig {
            name: t.name,
            score_threshold: t.score_threshold,
            iteration_threshold: t.iteration_threshold,
        })
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_audit_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrent_audits() -> u32 {
    12
}

fn default_max_concurrent_sessions() -> u32 {
    64
}

fn default_state_directory() -> PathBuf {
    directories::ProjectDirs::from("", "", "gan-audit")
        .map(|dirs| dirs.data_dir().join("sessions"))
        .unwrap_or_else(|| std::env::temp_dir().join("gan-audit").join("sessions"))
}

fn default_max_session_age_secs() -> u64 {
    60 * 60 * 24 * 7 // 7 days
}

fn default_session_cleanup_interval_secs() -> u64 {
    5 * 60
}

fn default_max_iterations() -> u32 {
    25
}

fn default_stagnation_threshold() -> f64 {
    0.95
}

fn default_stagnation_start_loop() -> u32 {
    10
}

fn default_executable_candidates() -> Vec<String> {
    vec!["gan-cli".into()]
}

fn default_min_version() -> String {
    "1.0.0".into()
}

fn default_audit_subcommand() -> String {
    "audit".into()
}

fn default_preserve_env_vars() -> Vec<String> {
    vec![
        "PATH".into(),
        "HOME".into(),
        "LANG".into(),
        "LC_ALL".into(),
        "TERM".into(),
        "XDG_CONFIG_HOME".into(),
        "XDG_DATA_HOME".into(),
    ]
}

fn default_version_probe_arg() -> String {
    "--version".into()
}

fn default_version_probe_timeout_ms() -> u64 {
    10_000
}

fn default_critical_persistence_start_loop() -> u32 {
    15
}

fn default_thought_history_cap() -> usize {
    500
}

fn default_max_output_bytes() -> usize {
    10 * 1024 * 1024
}

/// Every option has a default; the file is entirely optional. Mirrors the shape of this
/// codebase's existing project-config loader: one struct, `#[serde(default)]` on every field,
/// free functions for non-`Default`-able defaults, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GanConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub enable_gan_auditing: bool,
    #[serde(default = "default_audit_timeout_ms")]
    pub audit_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_audits")]
    pub max_concurrent_audits: u32,
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: u32,
    #[serde(default = "default_state_directory")]
    pub state_directory: PathBuf,
    #[serde(default = "default_max_session_age_secs")]
    pub max_session_age_secs: u64,
    #[serde(default = "default_session_cleanup_interval_secs")]
    pub session_cleanup_interval_secs: u64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_stagnation_threshold")]
    pub stagnation_threshold: f64,
    #[serde(default = "default_stagnation_start_loop")]
    pub stagnation_start_loop: u32,
    #[serde(default = "default_completion_tiers")]
    pub completion_tiers: Vec<CompletionTierConfig>,
    #[serde(default = "default_executable_candidates")]
    pub executable_candidates: Vec<String>,
    #[serde(default = "default_min_version")]
    pub min_version: String,
    #[serde(default = "default_audit_subcommand")]
    pub audit_subcommand: String,
    #[serde(default = "default_preserve_env_vars")]
    pub preserve_env_vars: Vec<String>,
    /// When `false`, the Request Handler dispatches audits as a detached, best-effort
    /// background task instead of running them inline on the request path (§4.I.5, the
    /// asynchronous legacy contract).
    #[serde(default = "default_true")]
    pub synchronous_mode: bool,
    #[serde(default = "default_version_probe_arg")]
    pub version_probe_arg: String,
    #[serde(default = "default_version_probe_timeout_ms")]
    pub version_probe_timeout_ms: u64,
    #[serde(default = "default_critical_persistence_start_loop")]
    pub critical_persistence_start_loop: u32,
    #[serde(default = "default_thought_history_cap")]
    pub thought_history_cap: usize,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for GanConfig {
    fn default() -> Self {
        GanConfig {
            enabled: default_true(),
            enable_gan_auditing: default_true(),
            audit_timeout_ms: default_audit_timeout_ms(),
            max_concurrent_audits: default_max_concurrent_audits(),
            max_concurrent_sessions: default_max_concurrent_sessions(),
            state_directory: default_state_directory(),
            max_session_age_secs: default_max_session_age_secs(),
            session_cleanup_interval_secs: default_session_cleanup_interval_secs(),
            max_iterations: default_max_iterations(),
            stagnation_threshold: default_stagnation_threshold(),
            stagnation_start_loop: default_stagnation_start_loop(),
            completion_tiers: default_completion_tiers(),
            executable_candidates: default_executable_candidates(),
            min_version: default_min_version(),
            audit_subcommand: default_audit_subcommand(),
            preserve_env_vars: default_preserve_env_vars(),
            synchronous_mode: default_true(),
            version_probe_arg: default_version_probe_arg(),
            version_probe_timeout_ms: default_version_probe_timeout_ms(),
            critical_persistence_start_loop: default_critical_persistence_start_loop(),
            thought_history_cap: default_thought_history_cap(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl GanConfig {
    /// Load from `path` if it exists; otherwise return the all-defaults config. Config is a
    /// collaborator (§1) so the *loader* mechanics stay minimal, but the schema it loads into
    /// is in scope.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            return Ok(GanConfig::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: GanConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn completion_tiers(&self) -> Vec<CompletionTier> {
        self.completion_tiers.iter().cloned().map(Into::into).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_nonexistent_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = GanConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.max_iterations, 25);
        assert!(config.enabled);
    }

    #[test]
    fn load_partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "auditTimeoutMs = 5000\n").unwrap();
        let config = GanConfig::load(&path).unwrap();
        assert_eq!(config.audit_timeout_ms, 5000);
        assert_eq!(config.max_concurrent_audits, 12);
    }

    #[test]
    fn default_completion_tiers_match_spec() {
        let config = GanConfig::default();
        let tiers = config.completion_tiers();
        assert_eq!(tiers.len(), 3);
        assert_eq!(tiers[0].name, "Excellence");
        assert_eq!(tiers[0].score_threshold, 95);
        assert_eq!(tiers[0].iteration_threshold, 10);
    }

    #[test]
    fn preserve_env_vars_includes_path_and_home() {
        let config = GanConfig::default();
        assert!(config.preserve_env_vars.contains(&"PATH".to_string()));
        assert!(config.preserve_env_vars.contains(&"HOME".to_string()));
    }

    #[test]
    fn synchronous_mode_defaults_to_true() {
        let config = GanConfig::default();
        assert!(config.synchronous_mode);
    }

    #[test]
    fn disabling_synchronous_mode_round_trips_through_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "synchronousMode = false\n").unwrap();
        let config = GanConfig::load(&path).unwrap();
        assert!(!config.synchronous_mode);
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid toml [[[").unwrap();
        assert!(GanConfig::load(&path).is_err());
    }
}
