use crate::config_block::extract_inline_config;
use gan_core::{AuditRequest, AuditReview, Budget, Diagnostic, GanError, RubricDimension};
use gan_env::ExecutableResolver;
use gan_process::{ExecuteOptions, ProcessManager};
use std::path::Path;
use std::time::Duration;

const PARSE_FAILURE_DETAIL_LIMIT: usize = 2048;

/// Everything the Audit Engine needs that does not change per call.
#[derive(Debug, Clone)]
pub struct AuditEngineConfig {
    pub enabled: bool,
    pub subcommand: String,
    pub timeout: Duration,
    pub default_rubric: Vec<RubricDimension>,
    pub preserve_env_vars: Vec<String>,
}

/// Composes the Environment Resolver, Process Manager, and inline config extractor into the
/// single `audit` operation (§4.D). Reentrant and thread-safe across sessions; ordering
/// within one session is the Request Handler's responsibility.
pub struct AuditEngine {
    resolver: ExecutableResolver,
    process: ProcessManager,
    config: AuditEngineConfig,
}

impl AuditEngine {
    pub fn new(resolver: ExecutableResolver, process: ProcessManager, config: AuditEngineConfig) -> Self {
        AuditEngine { resolver, process, config }
    }

    /// Forwarded to the owned Process Manager on server shutdown (§9): signal every
    /// still-running child and wait out the grace period before returning.
    pub async fn terminate_all(&self) {
        self.process.terminate_all().await;
    }

    pub async fn audit(&self, thought_text: &str, working_dir: &Path) -> Result<AuditReview, Diagnostic> {
        if !self.config.enabled {
            return Err(GanError::Validation("auditing is disabled".into()).into());
        }

        let inline = extract_inline_config(thought_text)?;

        let request = AuditRequest {
            candidate: thought_text.to_string(),
            task: inline.as_ref().and_then(|c| c.task.clone()).unwrap_or_default(),
            scope: inline.as_ref().map(|c| c.scope).unwrap_or_default(),
            rubric: self.config.default_rubric.clone(),
            budget: Budget {
                max_cycles: inline.as_ref().map(|c| c.max_cycles).unwrap_or(25),
                score_threshold: inline.as_ref().map(|c| c.threshold).unwrap_or(85),
            },
            judges: inline.map(|c| c.judges).unwrap_or_default(),
        };

        let executable = self.resolver.resolve()?;

        let stdin_payload = serde_json::to_vec(&request)
            .map_err(|e| Diagnostic::from(GanError::Validation(format!("failed to encode audit request: {e}"))))?;

        let env = std::env::vars()
            .filter(|(k, _)| self.config.preserve_env_vars.iter().any(|p| p == k))
            .collect();

        let args = vec![
            self.config.subcommand.clone(),
            "--cwd".to_string(),
            working_dir.display().to_string(),
        ];

        let opts = ExecuteOptions {
            working_dir: working_dir.to_path_buf(),
            timeout: self.config.timeout,
            env,
            stdin_payload: Some(stdin_payload),
        };

        let result = self.process.execute(&executable.to_string_lossy(), &args, opts).await?;

        if result.timed_out {
            return Err(GanError::Timeout(self.config.timeout.as_millis() as u64).into());
        }

        let review: AuditReview = serde_json::from_str(&result.stdout).map_err(|e| {
            Diagnostic::from(GanError::Parse(format!("audit CLI output did not match the expected schema: {e}")))
                .with_details_truncated(&result.stdout, PARSE_FAILURE_DETAIL_LIMIT)
        })?;

        review.validate().map_err(|e| Diagnostic::from(GanError::Validation(e)))?;

        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gan_core::default_rubric;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn config() -> AuditEngineConfig {
        AuditEngineConfig {
            enabled: true,
            subcommand: "audit".to_string(),
            timeout: Duration::from_secs(5),
            default_rubric: default_rubric(),
            preserve_env_vars: vec!["PATH".to_string()],
        }
    }

    /// Writes an executable shell script that ignores its argv and stdin, then prints
    /// `body` to stdout. Stands in for the external audit CLI.
    fn fake_audit_cli(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("fake-audit-cli");
        std::fs::write(&path, format!("#!/bin/sh\ncat > /dev/null\nprintf '%s' '{body}'\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn disabled_engine_returns_validation_diagnostic() {
        let resolver = ExecutableResolver::new(vec!["/bin/sh".to_string()]);
        let process = ProcessManager::new(4);
        let mut cfg = config();
        cfg.enabled = false;
        let engine = AuditEngine::new(resolver, process, cfg);
        let err = engine.audit("some thought", Path::new("/tmp")).await.unwrap_err();
        assert_eq!(err.category, gan_core::DiagnosticCategory::Validation);
    }

    #[tokio::test]
    async fn valid_json_response_is_parsed_and_validated() {
        let dir = tempdir().unwrap();
        let cli = fake_audit_cli(
            &dir,
            r#"{"overall":90,"verdict":"pass","dimensions":[{"name":"Correctness","score":90}],"review":{"summary":"looks good","inline":[]},"judgeCards":[]}"#,
        );
        let resolver = ExecutableResolver::new(vec![cli.to_string_lossy().to_string()]);
        let process = ProcessManager::new(4);
        let engine = AuditEngine::new(resolver, process, config());

        let review = engine
            .audit("```config\ntask = \"review\"\n```", dir.path())
            .await
            .unwrap();
        assert_eq!(review.overall, 90);
        assert_eq!(review.verdict, gan_core::Verdict::Pass);
    }

    #[tokio::test]
    async fn malformed_cli_output_is_a_parse_diagnostic() {
        let dir = tempdir().unwrap();
        let cli = fake_audit_cli(&dir, "not json at all");
        let resolver = ExecutableResolver::new(vec![cli.to_string_lossy().to_string()]);
        let process = ProcessManager::new(4);
        let engine = AuditEngine::new(resolver, process, config());

        let err = engine.audit("plain thought", dir.path()).await.unwrap_err();
        assert_eq!(err.category, gan_core::DiagnosticCategory::Parse);
        assert!(!err.details.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_score_is_a_validation_diagnostic() {
        let dir = tempdir().unwrap();
        let cli = fake_audit_cli(
            &dir,
            r#"{"overall":150,"verdict":"pass","dimensions":[{"name":"Correctness","score":90}],"review":{"summary":"x","inline":[]},"judgeCards":[]}"#,
        );
        let resolver = ExecutableResolver::new(vec![cli.to_string_lossy().to_string()]);
        let process = ProcessManager::new(4);
        let engine = AuditEngine::new(resolver, process, config());

        let err = engine.audit("plain thought", dir.path()).await.unwrap_err();
        assert_eq!(err.category, gan_core::DiagnosticCategory::Validation);
    }

    #[tokio::test]
    async fn missing_executable_surfaces_installation_diagnostic() {
        let resolver = ExecutableResolver::new(vec!["definitely-missing-cli-xyz".to_string()]);
        let process = ProcessManager::new(4);
        let engine = AuditEngine::new(resolver, process, config());
        let err = engine.audit("plain thought", Path::new("/tmp")).await.unwrap_err();
        assert_eq!(err.category, gan_core::DiagnosticCategory::Installation);
    }

    #[tokio::test]
    async fn malformed_inline_config_block_short_circuits_before_spawning() {
        let resolver = ExecutableResolver::new(vec!["definitely-missing-cli-xyz".to_string()]);
        let process = ProcessManager::new(4);
        let engine = AuditEngine::new(resolver, process, config());
        let err = engine
            .audit("```config\ntaks = \"typo\"\n```", Path::new("/tmp"))
            .await
            .unwrap_err();
        assert_eq!(err.category, gan_core::DiagnosticCategory::Validation);
    }
}
