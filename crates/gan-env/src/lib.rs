//! Environment Resolver (§4.A): executable discovery, working-directory resolution, and a
//! sanitized environment map builder.

use gan_core::{Diagnostic, GanError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Resolves and caches the external CLI's executable path for the lifetime of the process.
pub struct ExecutableResolver {
    candidates: Vec<String>,
    cache: OnceLock<Result<PathBuf, Diagnostic>>,
}

impl ExecutableResolver {
    pub fn new(candidates: Vec<String>) -> Self {
        ExecutableResolver { candidates, cache: OnceLock::new() }
    }

    /// Search configured candidate paths, then PATH. Verify the result exists and is
    /// executable. The result is cached after the first call.
    pub fn resolve(&self) -> Result<PathBuf, Diagnostic> {
        self.cache
            .get_or_init(|| self.resolve_uncached())
            .clone()
    }

    fn resolve_uncached(&self) -> Result<PathBuf, Diagnostic> {
        for candidate in &self.candidates {
            let path = Path::new(candidate);
            if path.is_absolute() && is_executable(path) {
                return Ok(path.to_path_buf());
            }
            if let Ok(found) = which::which(candidate) {
                if is_executable(&found) {
                    return Ok(found);
                }
            }
        }
        Err(GanError::Installation(format!(
            "none of the configured executable candidates {:?} were found on PATH",
            self.candidates
        ))
        .into())
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

const REPO_MARKERS: &[&str] = &[".git", "Cargo.toml", "package.json", "pyproject.toml"];

/// If `hint` is a readable directory inside (or equal to) the process CWD tree, use it.
/// Otherwise walk upward from `cwd` looking for a repository marker, falling back to `cwd`
/// itself. Symlink escapes are rejected by canonicalizing both sides before comparing.
pub fn resolve_working_directory(hint: Option<&Path>, cwd: &Path) -> Result<PathBuf, Diagnostic> {
    let canonical_cwd = std::fs::canonicalize(cwd)
        .map_err(|e| GanError::Environment(format!("cannot canonicalize cwd {}: {e}", cwd.display())))?;

    if let Some(hint) = hint {
        if hint.is_dir() {
            let canonical_hint = std::fs::canonicalize(hint).map_err(|e| {
                GanError::Environment(format!("cannot canonicalize working-dir hint {}: {e}", hint.display()))
            })?;
            if canonical_hint.starts_with(&canonical_cwd) {
                return Ok(canonical_hint);
            }
            return Err(GanError::Environment(format!(
                "working-directory hint {} escapes the process CWD tree",
                hint.display()
            ))
            .into());
        }
    }

    for ancestor in canonical_cwd.ancestors() {
        if REPO_MARKERS.iter().any(|marker| ancestor.join(marker).exists()) {
            return Ok(ancestor.to_path_buf());
        }
    }

    Ok(canonical_cwd)
}

/// Start from `preserve_list`, add `extra`, and omit everything else. A pure function over
/// an injected environment snapshot so it is unit-testable without touching the real
/// process environment.
pub fn build_environment(
    process_env: &[(String, String)],
    preserve_list: &[&str],
    extra: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (key, value) in process_env {
        if preserve_list.contains(&key.as_str()) {
            out.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in extra {
        out.insert(key.clone(), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolve_finds_absolute_executable_candidate() {
        let resolver = ExecutableResolver::new(vec!["/bin/sh".to_string()]);
        let path = resolver.resolve().unwrap();
        assert_eq!(path, PathBuf::from("/bin/sh"));
    }

    #[test]
    fn resolve_is_cached_after_first_call() {
        let resolver = ExecutableResolver::new(vec!["/bin/sh".to_string()]);
        let first = resolver.resolve().unwrap();
        let second = resolver.resolve().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn resolve_fails_when_no_candidate_found() {
        let resolver = ExecutableResolver::new(vec!["definitely-not-a-real-binary-xyz".to_string()]);
        let err = resolver.resolve().unwrap_err();
        assert_eq!(err.category, gan_core::DiagnosticCategory::Installation);
    }

    #[test]
    fn working_directory_hint_inside_cwd_is_accepted() {
        let cwd = tempdir().unwrap();
        let sub = cwd.path().join("repo");
        std::fs::create_dir(&sub).unwrap();
        let resolved = resolve_working_directory(Some(&sub), cwd.path()).unwrap();
        assert_eq!(resolved, std::fs::canonicalize(&sub).unwrap());
    }

    #[test]
    fn working_directory_hint_outside_cwd_is_rejected() {
        let cwd = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let err = resolve_working_directory(Some(outside.path()), cwd.path()).unwrap_err();
        assert_eq!(err.category, gan_core::DiagnosticCategory::Environment);
    }

    #[test]
    fn missing_hint_walks_up_for_repo_marker() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("Cargo.toml"), "[package]\nname=\"x\"").unwrap();
        let nested = root.path().join("crates/sub");
        std::fs::create_dir_all(&nested).unwrap();
        let resolved = resolve_working_directory(None, &nested).unwrap();
        assert_eq!(resolved, std::fs::canonicalize(root.path()).unwrap());
    }

    #[test]
    fn falls_back_to_cwd_when_no_marker_found() {
        let dir = tempdir().unwrap();
        let resolved = resolve_working_directory(None, dir.path()).unwrap();
        assert_eq!(resolved, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn build_environment_preserves_only_listed_vars() {
        let process_env = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("SECRET_TOKEN".to_string(), "sk-abc123".to_string()),
        ];
        let extra = HashMap::new();
        let env = build_environment(&process_env, &["PATH"], &extra);
        assert_eq!(env.get("PATH").unwrap(), "/usr/bin");
        assert!(!env.contains_key("SECRET_TOKEN"));
    }

    #[test]
    fn build_environment_merges_operator_extras() {
        let process_env = vec![("PATH".to_string(), "/usr/bin".to_string())];
        let mut extra = HashMap::new();
        extra.insert("GAN_SCOPE".to_string(), "workspace".to_string());
        let env = build_environment(&process_env, &["PATH"], &extra);
        assert_eq!(env.get("GAN_SCOPE").unwrap(), "workspace");
        assert_eq!(env.len(), 2);
    }
}
