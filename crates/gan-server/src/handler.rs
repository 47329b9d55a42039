//! Request Handler (§4.I): the per-request lifecycle that owns thought history, branch
//! tracking, the audit-worthy decision, per-session locking, and dispatch to either the
//! synchronous audit path or the fire-and-forget legacy path.

use crate::assembler::{assemble, StandardFields};
use crate::locks::SessionLocks;
use crate::trigger::is_audit_worthy;
use gan_audit::AuditEngine;
use gan_core::{
    CompletionResult, Diagnostic, GanError, IterationRecord, ResponseEnvelope, Thought,
};
use gan_eval::KillSwitchConfig;
use gan_feedback::FeedbackDocument;
use gan_session::{ContextOp, SessionStore};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_SESSION_ID: &str = "default";

/// Everything the handler needs to know that does not change per request.
pub struct HandlerConfig {
    pub synchronous: bool,
    pub thought_history_cap: usize,
    pub stagnation_threshold: f64,
    pub completion_tiers: Vec<gan_core::CompletionTier>,
    pub kill_switches: KillSwitchConfig,
}

/// Window size for the Stagnation Detector (§4.G): "a window of 3".
const STAGNATION_WINDOW: usize = 3;

/// The outcome of one `handle` call: the envelope the transport replies with, plus an
/// optional structured feedback document (§4.J) attached only when an audit actually ran.
pub struct HandlerOutcome {
    pub envelope: ResponseEnvelope,
    pub feedback: Option<FeedbackDocument>,
}

pub struct RequestHandler {
    thought_history: Mutex<VecDeque<Thought>>,
    branches: Mutex<HashMap<String, Vec<i64>>>,
    locks: SessionLocks,
    audit_engine: Arc<AuditEngine>,
    session_store: Arc<SessionStore>,
    config: HandlerConfig,
}

impl RequestHandler {
    pub fn new(audit_engine: Arc<AuditEngine>, session_store: Arc<SessionStore>, config: HandlerConfig) -> Self {
        RequestHandler {
            thought_history: Mutex::new(VecDeque::new()),
            branches: Mutex::new(HashMap::new()),
            locks: SessionLocks::new(),
            audit_engine,
            session_store,
            config,
        }
    }

    fn validate(thought: &Thought) -> Result<(), Diagnostic> {
        if thought.thought.trim().is_empty() {
            return Err(GanError::Validation("thought text must not be empty".into()).into());
        }
        if thought.thought_number < 1 {
            return Err(GanError::Validation("thoughtNumber must be >= 1".into()).into());
        }
        if thought.total_thoughts < 1 {
            return Err(GanError::Validation("totalThoughts must be >= 1".into()).into());
        }
        Ok(())
    }

    /// Push `thought` into the bounded history ring, evicting the oldest entry first once
    /// the configured cap is reached, and record its thought number against its branch.
    fn record_history(&self, thought: &Thought) -> usize {
        {
            let mut history = self.thought_history.lock().unwrap();
            if history.len() >= self.config.thought_history_cap {
                history.pop_front();
            }
            history.push_back(thought.clone());
        }

        if let Some(branch_id) = &thought.branch_id {
            let mut branches = self.branches.lock().unwrap();
            branches.entry(branch_id.clone()).or_default().push(thought.thought_number as i64);
        }

        self.thought_history.lock().unwrap().len()
    }

    fn known_branches(&self) -> Vec<String> {
        let mut names: Vec<String> = self.branches.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Single entry point the MCP transport calls per `tools/call` (§4.I.1).
    pub async fn handle(&self, thought: Thought, cancel: CancellationToken) -> Result<HandlerOutcome, Diagnostic> {
        Self::validate(&thought)?;

        let history_len = self.record_history(&thought);
        let branches = self.known_branches();

        let standard = StandardFields {
            thought_number: thought.thought_number,
            total_thoughts: thought.total_thoughts,
            next_thought_needed: thought.next_thought_needed,
            branches,
            thought_history_length: history_len,
        };

        if !is_audit_worthy(&thought.thought) {
            let envelope = assemble(standard, thought.branch_id.clone(), None, None)?;
            return Ok(HandlerOutcome { envelope, feedback: None });
        }

        let session_id = thought.branch_id.clone().unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

        if !self.config.synchronous {
            self.dispatch_detached(thought.clone(), session_id.clone());
            let envelope = assemble(standard, Some(session_id), None, None)?;
            return Ok(HandlerOutcome { envelope, feedback: None });
        }

        let _session_guard = self.locks.acquire(&session_id).await;
        self.run_synchronous_audit(thought, session_id, standard, cancel).await
    }

    async fn run_synchronous_audit(
        &self,
        thought: Thought,
        session_id: String,
        standard: StandardFields,
        cancel: CancellationToken,
    ) -> Result<HandlerOutcome, Diagnostic> {
        let session = self
            .session_store
            .get_or_create(&session_id, thought.loop_id.as_deref())
            .map_err(|e| Diagnostic::from(GanError::Environment(format!("session store error: {e:#}"))))?;

        if session.is_complete {
            info!(session_id, "session already complete; skipping re-audit");
            let completion = CompletionResult {
                status: gan_core::CompletionStatus::Completed,
                reason: session.completion_reason.clone().unwrap_or_else(|| "session previously completed".into()),
                next_thought_needed: false,
                tier: None,
                kill_switch: None,
            };
            let last_review = session.iterations.last().map(|it| it.audit_result.clone());
            let envelope = assemble(standard, Some(session_id), last_review, Some(completion))?;
            return Ok(HandlerOutcome { envelope, feedback: None });
        }

        let working_dir = self.resolve_working_dir()?;

        let review = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(session_id, "audit cancelled by caller disconnect/deadline before completion");
                return Err(GanError::Process("request cancelled before audit completed".into()).into());
            }
            result = self.audit_engine.audit(&thought.thought, &working_dir) => result?,
        };

        let updated_session = self
            .session_store
            .append(
                &session_id,
                IterationRecord {
                    thought_number: thought.thought_number,
                    code: thought.thought.clone(),
                    audit_result: review.clone(),
                    timestamp: chrono::Utc::now(),
                },
            )
            .map_err(|e| Diagnostic::from(GanError::Environment(format!("failed to append iteration: {e:#}"))))?;

        let window: Vec<String> = updated_session
            .iterations
            .iter()
            .rev()
            .take(STAGNATION_WINDOW)
            .map(|it| it.code.clone())
            .collect();
        let stagnant = gan_eval::is_stagnant(&window, self.config.stagnation_threshold);

        let completion = gan_eval::evaluate(
            review.overall,
            updated_session.current_loop,
            &self.config.completion_tiers,
            stagnant,
            review.has_critical_comment(),
            &self.config.kill_switches,
        );

        if !matches!(completion.status, gan_core::CompletionStatus::InProgress) {
            let mut finished = updated_session.clone();
            finished.is_complete = true;
            finished.completion_reason = Some(completion.reason.clone());
            self.session_store
                .update(&finished)
                .map_err(|e| Diagnostic::from(GanError::Environment(format!("failed to persist completion: {e:#}"))))?;
            let op = ContextOp::Terminate(completion.reason.as_str());
            if let Err(e) = self.session_store.context_lifecycle(&session_id, op) {
                warn!(session_id, error = %e, "external-CLI context termination failed (best-effort, non-fatal)");
            }
        }

        let feedback = gan_feedback::build_feedback(&review, &updated_session.iterations);
        let envelope = assemble(standard, Some(session_id), Some(review), Some(completion))?;
        Ok(HandlerOutcome { envelope, feedback: Some(feedback) })
    }

    /// Legacy fire-and-forget path (§4.I.5, §9): runs the audit in a detached task whose
    /// result is logged only, never correlated back to this request's response.
    fn dispatch_detached(&self, thought: Thought, session_id: String) {
        let audit_engine = self.audit_engine.clone();
        let session_store = self.session_store.clone();
        let working_dir = self.resolve_working_dir();
        tokio::spawn(async move {
            let working_dir = match working_dir {
                Ok(dir) => dir,
                Err(diag) => {
                    warn!(session_id, ?diag, "detached audit: could not resolve working directory");
                    return;
                }
            };
            if let Err(e) = session_store.get_or_create(&session_id, thought.loop_id.as_deref()) {
                warn!(session_id, error = %e, "detached audit: failed to initialize session");
                return;
            }
            match audit_engine.audit(&thought.thought, &working_dir).await {
                Ok(review) => {
                    info!(session_id, overall = review.overall, verdict = ?review.verdict, "detached audit completed");
                    let record = IterationRecord {
                        thought_number: thought.thought_number,
                        code: thought.thought,
                        audit_result: review,
                        timestamp: chrono::Utc::now(),
                    };
                    if let Err(e) = session_store.append(&session_id, record) {
                        warn!(session_id, error = %e, "detached audit: failed to append iteration");
                    }
                }
                Err(diag) => {
                    warn!(session_id, ?diag, "detached audit failed");
                }
            }
        });
    }

    fn resolve_working_dir(&self) -> Result<PathBuf, Diagnostic> {
        let cwd = std::env::current_dir()
            .map_err(|e| Diagnostic::from(GanError::Environment(format!("cannot determine process cwd: {e}"))))?;
        gan_env::resolve_working_directory(None, &cwd)
    }
}
