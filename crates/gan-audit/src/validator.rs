use gan_process::{ExecuteOptions, ProcessManager};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").unwrap());

/// Result of the one-shot startup availability check (§4.C).
#[derive(Debug, Clone)]
pub struct CodexValidationResult {
    pub available: bool,
    pub version: Option<String>,
    pub environment_issues: Vec<String>,
    pub recommendations: Vec<String>,
}

fn parse_semver(line: &str) -> Option<(u64, u64, u64)> {
    let caps = VERSION_RE.captures(line)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?))
}

/// Run `executable version_arg` once under `timeout` and compare the first line of stdout
/// against `min_version`. Never retried: a failed validation keeps the server from serving
/// audit requests until it is restarted (§4.C, matching the no-mock-fallback Non-goal).
pub async fn validate_availability(
    process: &ProcessManager,
    executable: &Path,
    version_arg: &str,
    min_version: &str,
    working_dir: &Path,
    timeout: Duration,
) -> CodexValidationResult {
    let opts = ExecuteOptions {
        working_dir: working_dir.to_path_buf(),
        timeout,
        env: Vec::new(),
        stdin_payload: None,
    };

    let result = process
        .execute(&executable.to_string_lossy(), &[version_arg.to_string()], opts)
        .await;

    let result = match result {
        Ok(r) => r,
        Err(diag) => {
            return CodexValidationResult {
                available: false,
                version: None,
                environment_issues: vec![diag.message],
                recommendations: diag.suggestions,
            };
        }
    };

    let first_line = result.stdout.lines().next().unwrap_or("").trim();
    let Some(found) = parse_semver(first_line) else {
        return CodexValidationResult {
            available: false,
            version: None,
            environment_issues: vec![format!(
                "could not find a semantic version in the first line of `{version_arg}` output: {first_line:?}"
            )],
            recommendations: vec!["Confirm the configured executable is the right CLI".into()],
        };
    };

    let Some(required) = parse_semver(min_version) else {
        return CodexValidationResult {
            available: false,
            version: Some(format!("{}.{}.{}", found.0, found.1, found.2)),
            environment_issues: vec![format!("configured minVersion {min_version:?} is not a valid semantic version")],
            recommendations: vec!["Fix the configured minVersion".into()],
        };
    };

    if found < required {
        return CodexValidationResult {
            available: false,
            version: Some(format!("{}.{}.{}", found.0, found.1, found.2)),
            environment_issues: vec![format!(
                "installed version {}.{}.{} is older than the required minimum {}.{}.{}",
                found.0, found.1, found.2, required.0, required.1, required.2
            )],
            recommendations: vec!["Upgrade the external code-analysis CLI".into()],
        };
    }

    CodexValidationResult {
        available: true,
        version: Some(format!("{}.{}.{}", found.0, found.1, found.2)),
        environment_issues: Vec::new(),
        recommendations: Vec::new(),
    }
}
