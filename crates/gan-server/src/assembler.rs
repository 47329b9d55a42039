//! Response Assembler (§4.H): deterministic merge of the standard envelope, an optional
//! audit review, and an optional completion result into the single typed reply the MCP
//! transport hands back to the upstream agent.

use gan_core::{AuditReview, CompletionResult, CompletionStatus, Diagnostic, GanError, ResponseEnvelope, Verdict};

/// `thoughtNumber`/`totalThoughts`/`nextThoughtNeeded` plus the bookkeeping fields the
/// Request Handler has already computed before the audit (or lack of one) is known.
#[derive(Debug, Clone)]
pub struct StandardFields {
    pub thought_number: u32,
    pub total_thoughts: u32,
    pub next_thought_needed: bool,
    pub branches: Vec<String>,
    pub thought_history_length: usize,
}

/// Compose the envelope. The override rule is an explicit decision table, not nested
/// booleans: a completed/terminated completion always wins; short of that, a `revise` or
/// `reject` verdict forces `nextThoughtNeeded = true` even if the caller's thought said
/// otherwise.
pub fn assemble(
    standard: StandardFields,
    session_id: Option<String>,
    review: Option<AuditReview>,
    completion: Option<CompletionResult>,
) -> Result<ResponseEnvelope, Diagnostic> {
    let mut next_thought_needed = standard.next_thought_needed;

    if let Some(review) = &review {
        let verdict_forces_continuation = matches!(review.verdict, Verdict::Revise | Verdict::Reject);
        if verdict_forces_continuation && !next_thought_needed {
            tracing::warn!(
                verdict = ?review.verdict,
                "response assembler: overriding nextThoughtNeeded=false because verdict requires revision"
            );
            next_thought_needed = true;
        }
    }

    let mut annotated_review = review;

    if let Some(completion) = &completion {
        match completion.status {
            CompletionStatus::Completed | CompletionStatus::Terminated => {
                if next_thought_needed {
                    tracing::warn!(
                        status = ?completion.status,
                        "response assembler: completion result overrides nextThoughtNeeded to false"
                    );
                }
                next_thought_needed = false;
            }
            CompletionStatus::InProgress => {}
        }

        if let Some(review) = annotated_review.as_mut() {
            let annotation = match completion.status {
                CompletionStatus::Completed => {
                    let tier_name = completion.tier.as_ref().map(|t| t.name.as_str()).unwrap_or("unknown");
                    format!("\n\n✅ COMPLETION: {tier_name}\n{}", completion.reason)
                }
                CompletionStatus::Terminated => {
                    let switch_name = completion.kill_switch.as_ref().map(|k| k.name.as_str()).unwrap_or("unknown");
                    format!("\n\n⚠️ TERMINATED: {switch_name}\n{}", completion.reason)
                }
                CompletionStatus::InProgress => String::new(),
            };
            if !annotation.is_empty() {
                review.review.summary.push_str(&annotation);
            }
        }
    }

    if let Some(review) = &annotated_review {
        review
            .validate()
            .map_err(|e| Diagnostic::from(GanError::Validation(format!("assembled envelope carries an invalid review: {e}"))))?;
    }

    Ok(ResponseEnvelope {
        thought_number: standard.thought_number,
        total_thoughts: standard.total_thoughts,
        next_thought_needed,
        branches: standard.branches,
        thought_history_length: standard.thought_history_length,
        session_id,
        gan: annotated_review,
        completion,
    })
}
