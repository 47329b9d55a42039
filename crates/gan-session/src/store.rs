use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gan_core::{IterationRecord, Session};
use std::path::{Path, PathBuf};

/// One file per session under `state_dir`, written atomically (`{id}.tmp` then
/// `fs::rename` over `{id}.json`). Reads are single-shot: nothing is cached in memory
/// across calls, matching "Reads are single-shot" in §4.E.
pub struct SessionStore {
    state_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextOp<'a> {
    Start,
    Maintain,
    Terminate(&'a str),
}

impl SessionStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir)
            .with_context(|| format!("creating session state directory {}", state_dir.display()))?;
        Ok(SessionStore { state_dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.state_dir.join(format!("{id}.json"))
    }

    /// Atomic write of `id.tmp`, fsync, then rename over `id.json` — the rewrite pattern
    /// used throughout this codebase for any on-disk record that must never be observed
    /// half-written by a concurrent reader (§8 invariant 6).
    fn write_atomic(&self, id: &str, session: &Session) -> Result<()> {
        let final_path = self.path_for(id);
        let tmp_path = self.state_dir.join(format!("{id}.tmp"));
        let content = serde_json::to_string_pretty(session).context("serializing session")?;
        {
            let mut file = std::fs::File::create(&tmp_path)
                .with_context(|| format!("creating temp file {}", tmp_path.display()))?;
            use std::io::Write;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("renaming {} to {}", tmp_path.display(), final_path.display()))?;
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Option<Session>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading session file {}", path.display()))?;
        let session: Session = serde_json::from_str(&content)
            .with_context(|| format!("parsing session file {}", path.display()))?;
        Ok(Some(session))
    }

    /// Load the session if it exists, or create (and persist) a fresh one.
    pub fn get_or_create(&self, id: &str, loop_id: Option<&str>) -> Result<Session> {
        if let Some(session) = self.read(id)? {
            return Ok(session);
        }
        let mut session = Session::new(id, Utc::now());
        session.codex_context_id = loop_id.map(|s| s.to_string());
        self.write_atomic(id, &session)?;
        Ok(session)
    }

    /// Append an iteration, failing if the session is already complete (§3 invariant:
    /// once `isComplete=true`, no further iterations may be appended).
    pub fn append(&self, id: &str, record: IterationRecord) -> Result<Session> {
        let mut session = self
            .read(id)?
            .ok_or_else(|| anyhow::anyhow!("session '{id}' does not exist"))?;
        if session.is_complete {
            anyhow::bail!("session '{id}' is already complete; cannot append further iterations");
        }
        session.iterations.push(record);
        session.current_loop = session.iterations.len() as u32;
        session.updated_at = Utc::now();
        self.write_atomic(id, &session)?;
        Ok(session)
    }

    /// Replace the full session record (used to persist completion/termination state).
    pub fn update(&self, session: &Session) -> Result<()> {
        let mut session = session.clone();
        session.updated_at = Utc::now();
        self.write_atomic(&session.id, &session)
    }

    /// Delete sessions whose `updatedAt` is older than `max_age`. Corrupt or unreadable
    /// files are logged and skipped rather than aborting the sweep.
    pub fn reap(&self, now: DateTime<Utc>, max_age: ChronoDuration) -> Result<usize> {
        let mut reaped = 0;
        let entries = std::fs::read_dir(&self.state_dir)
            .with_context(|| format!("listing session directory {}", self.state_dir.display()))?;
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read session directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read session file during reap");
                    continue;
                }
            };
            let session: Session = match serde_json::from_str(&content) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping corrupt session file during reap");
                    continue;
                }
            };
            if now.signed_duration_since(session.updated_at) > max_age {
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove stale session file");
                    continue;
                }
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    /// Best-effort external-CLI context-window lifecycle management. Failures here are
    /// logged and tolerated — they must never block or fail an audit (§9).
    pub fn context_lifecycle(&self, id: &str, op: ContextOp<'_>) -> Result<()> {
        let Some(mut session) = self.read(id)? else {
            return Ok(());
        };
        match op {
            ContextOp::Start => {
                session.codex_context_active = true;
            }
            ContextOp::Maintain => {
                // no-op placeholder: a real context keep-alive would ping the external CLI here.
            }
            ContextOp::Terminate(reason) => {
                session.codex_context_active = false;
                session.completion_reason.get_or_insert_with(|| reason.to_string());
            }
        }
        self.write_atomic(id, &session)
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gan_core::{AuditReview, DimensionScore, Review, Verdict};
    use tempfile::tempdir;

    fn sample_review(overall: u8) -> AuditReview {
        AuditReview {
            overall,
            verdict: Verdict::Revise,
            dimensions: vec![DimensionScore { name: "Correctness".into(), score: overall }],
            review: Review { summary: "ok".into(), inline: vec![] },
            judge_cards: vec![],
        }
    }

    #[test]
    fn get_or_create_creates_new_session_once() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let session = store.get_or_create("S1", None).unwrap();
        assert_eq!(session.id, "S1");
        assert_eq!(session.current_loop, 0);

        let again = store.get_or_create("S1", None).unwrap();
        assert_eq!(again.created_at, session.created_at);
    }

    #[test]
    fn append_increments_current_loop_and_keeps_invariant() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        store.get_or_create("S1", None).unwrap();
        let record = IterationRecord {
            thought_number: 1,
            code: "console.log(1)".into(),
            audit_result: sample_review(70),
            timestamp: Utc::now(),
        };
        let session = store.append("S1", record).unwrap();
        assert_eq!(session.current_loop, 1);
        assert!(session.invariant_holds());
    }

    #[test]
    fn append_fails_once_session_complete() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let mut session = store.get_or_create("S1", None).unwrap();
        session.is_complete = true;
        store.update(&session).unwrap();

        let record = IterationRecord {
            thought_number: 1,
            code: "x".into(),
            audit_result: sample_review(96),
            timestamp: Utc::now(),
        };
        assert!(store.append("S1", record).is_err());
    }

    #[test]
    fn session_write_then_read_round_trips_equal() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let mut session = store.get_or_create("S1", Some("ctx-1")).unwrap();
        session.current_loop = 2;
        session.iterations.push(IterationRecord {
            thought_number: 1,
            code: "a".into(),
            audit_result: sample_review(80),
            timestamp: Utc::now(),
        });
        session.iterations.push(IterationRecord {
            thought_number: 2,
            code: "b".into(),
            audit_result: sample_review(85),
            timestamp: Utc::now(),
        });
        store.update(&session).unwrap();

        let loaded = store.read(&session.id).unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.current_loop, session.current_loop);
        assert_eq!(loaded.iterations.len(), session.iterations.len());
        assert_eq!(loaded.codex_context_id, Some("ctx-1".to_string()));
    }

    #[test]
    fn reap_removes_sessions_older_than_max_age() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let mut stale = store.get_or_create("STALE", None).unwrap();
        stale.updated_at = Utc::now() - ChronoDuration::days(30);
        store.update(&stale).unwrap();
        // update() stamps updated_at = now, so write the stale timestamp directly.
        let path = store.path_for("STALE");
        let mut reloaded: Session = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        reloaded.updated_at = Utc::now() - ChronoDuration::days(30);
        std::fs::write(&path, serde_json::to_string_pretty(&reloaded).unwrap()).unwrap();

        store.get_or_create("FRESH", None).unwrap();

        let reaped = store.reap(Utc::now(), ChronoDuration::days(7)).unwrap();
        assert_eq!(reaped, 1);
        assert!(store.read("STALE").unwrap().is_none());
        assert!(store.read("FRESH").unwrap().is_some());
    }

    #[test]
    fn reap_tolerates_corrupt_files() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("CORRUPT.json"), "{ not json").unwrap();
        store.get_or_create("OK", None).unwrap();
        let reaped = store.reap(Utc::now(), ChronoDuration::days(7)).unwrap();
        assert_eq!(reaped, 0);
    }

    #[test]
    fn context_lifecycle_terminate_is_best_effort_and_non_blocking() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        store.get_or_create("S1", Some("ctx-1")).unwrap();
        store.context_lifecycle("S1", ContextOp::Start).unwrap();
        let session = store.read("S1").unwrap().unwrap();
        assert!(session.codex_context_active);

        store.context_lifecycle("S1", ContextOp::Terminate("budget exhausted")).unwrap();
        let session = store.read("S1").unwrap().unwrap();
        assert!(!session.codex_context_active);
        assert_eq!(session.completion_reason.as_deref(), Some("budget exhausted"));

        // context ops on an unknown session id never error.
        assert!(store.context_lifecycle("UNKNOWN", ContextOp::Maintain).is_ok());
    }
}
