use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound request from the upstream coding agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thought {
    pub thought: String,
    pub thought_number: u32,
    pub total_thoughts: u32,
    pub next_thought_needed: bool,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub loop_id: Option<String>,
    #[serde(default)]
    pub is_revision: Option<bool>,
    #[serde(default)]
    pub revises_thought: Option<u32>,
    #[serde(default)]
    pub branch_from_thought: Option<u32>,
}

/// Repository scope handed to the external CLI as part of an [`AuditRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextScope {
    Diff,
    Paths,
    Workspace,
}

impl Default for ContextScope {
    fn default() -> Self {
        ContextScope::Diff
    }
}

/// One named, weighted scoring dimension in the rubric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricDimension {
    pub name: String,
    pub weight: u8,
}

/// The six fixed rubric dimensions and their default weights (sum to 100).
pub fn default_rubric() -> Vec<RubricDimension> {
    vec![
        RubricDimension { name: "Correctness".into(), weight: 30 },
        RubricDimension { name: "Tests".into(), weight: 20 },
        RubricDimension { name: "Style".into(), weight: 15 },
        RubricDimension { name: "Security".into(), weight: 15 },
        RubricDimension { name: "Performance".into(), weight: 10 },
        RubricDimension { name: "Docs".into(), weight: 10 },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub max_cycles: u32,
    pub score_threshold: u8,
}

impl Default for Budget {
    fn default() -> Self {
        Budget { max_cycles: 25, score_threshold: 85 }
    }
}

/// Request sent to the external code-analysis CLI on stdin as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    pub candidate: String,
    pub task: String,
    pub scope: ContextScope,
    pub rubric: Vec<RubricDimension>,
    pub budget: Budget,
    #[serde(default)]
    pub judges: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Revise,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScore {
    pub name: String,
    pub score: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineComment {
    pub path: String,
    pub line: u32,
    pub comment: String,
    #[serde(default)]
    pub critical: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub summary: String,
    #[serde(default)]
    pub inline: Vec<InlineComment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeCard {
    pub model: String,
    pub score: u8,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Strictly-parsed response from the external CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReview {
    pub overall: u8,
    pub verdict: Verdict,
    pub dimensions: Vec<DimensionScore>,
    pub review: Review,
    #[serde(default)]
    pub judge_cards: Vec<JudgeCard>,
}

impl AuditReview {
    /// `true` if any inline comment is flagged critical (used by the critical-persistence
    /// kill switch).
    pub fn has_critical_comment(&self) -> bool {
        self.review.inline.iter().any(|c| c.critical)
    }

    /// Range/shape validation beyond what serde already enforces.
    pub fn validate(&self) -> Result<(), String> {
        if self.overall > 100 {
            return Err(format!("overall score {} out of range 0..=100", self.overall));
        }
        if self.dimensions.is_empty() {
            return Err("dimensions must not be empty".into());
        }
        for d in &self.dimensions {
            if d.score > 100 {
                return Err(format!("dimension '{}' score {} out of range 0..=100", d.name, d.score));
            }
        }
        Ok(())
    }
}

/// One audited revision of a thought within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub thought_number: u32,
    pub code: String,
    pub audit_result: AuditReview,
    pub timestamp: DateTime<Utc>,
}

/// Durable per-session record of iterations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub current_loop: u32,
    #[serde(default)]
    pub iterations: Vec<IterationRecord>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub completion_reason: Option<String>,
    #[serde(default)]
    pub codex_context_id: Option<String>,
    #[serde(default)]
    pub codex_context_active: bool,
}

impl Session {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Session {
            id: id.into(),
            created_at: now,
            updated_at: now,
            current_loop: 0,
            iterations: Vec::new(),
            is_complete: false,
            completion_reason: None,
            codex_context_id: None,
            codex_context_active: false,
        }
    }

    /// §3 invariant: `iterations.length == currentLoop`.
    pub fn invariant_holds(&self) -> bool {
        self.iterations.len() as u32 == self.current_loop
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    InProgress,
    Completed,
    Terminated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionTier {
    pub name: String,
    pub score_threshold: u8,
    pub iteration_threshold: u32,
}

/// Default tiers per §4.F, evaluated top-down, first match wins.
pub fn default_tiers() -> Vec<CompletionTier> {
    vec![
        CompletionTier { name: "Excellence".into(), score_threshold: 95, iteration_threshold: 10 },
        CompletionTier { name: "High quality".into(), score_threshold: 90, iteration_threshold: 15 },
        CompletionTier { name: "Acceptable".into(), score_threshold: 85, iteration_threshold: 20 },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchHit {
    pub name: String,
    pub condition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub status: CompletionStatus,
    pub reason: String,
    pub next_thought_needed: bool,
    #[serde(default)]
    pub tier: Option<CompletionTier>,
    #[serde(default)]
    pub kill_switch: Option<KillSwitchHit>,
}

/// The standard response envelope sent back over the MCP transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub thought_number: u32,
    pub total_thoughts: u32,
    pub next_thought_needed: bool,
    pub branches: Vec<String>,
    pub thought_history_length: usize,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub gan: Option<AuditReview>,
    #[serde(default)]
    pub completion: Option<CompletionResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_invariant_holds_when_empty() {
        let s = Session::new("abc", Utc::now());
        assert!(s.invariant_holds());
    }

    #[test]
    fn session_invariant_breaks_on_mismatch() {
        let mut s = Session::new("abc", Utc::now());
        s.current_loop = 1;
        assert!(!s.invariant_holds());
    }

    #[test]
    fn default_tiers_are_ordered_excellence_first() {
        let tiers = default_tiers();
        assert_eq!(tiers[0].name, "Excellence");
        assert_eq!(tiers[1].name, "High quality");
        assert_eq!(tiers[2].name, "Acceptable");
    }

    #[test]
    fn default_rubric_weights_sum_to_100() {
        let total: u32 = default_rubric().iter().map(|d| d.weight as u32).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn audit_review_rejects_out_of_range_overall() {
        let review = AuditReview {
            overall: 150,
            verdict: Verdict::Pass,
            dimensions: vec![DimensionScore { name: "Correctness".into(), score: 90 }],
            review: Review { summary: "ok".into(), inline: vec![] },
            judge_cards: vec![],
        };
        assert!(review.validate().is_err());
    }

    #[test]
    fn audit_review_rejects_empty_dimensions() {
        let review = AuditReview {
            overall: 90,
            verdict: Verdict::Pass,
            dimensions: vec![],
            review: Review { summary: "ok".into(), inline: vec![] },
            judge_cards: vec![],
        };
        assert!(review.validate().is_err());
    }

    #[test]
    fn audit_review_has_critical_comment_detects_flag() {
        let review = AuditReview {
            overall: 50,
            verdict: Verdict::Revise,
            dimensions: vec![DimensionScore { name: "Security".into(), score: 40 }],
            review: Review {
                summary: "needs work".into(),
                inline: vec![InlineComment {
                    path: "src/lib.rs".into(),
                    line: 10,
                    comment: "sql injection".into(),
                    critical: true,
                }],
            },
            judge_cards: vec![],
        };
        assert!(review.has_critical_comment());
    }

    #[test]
    fn thought_roundtrips_through_json() {
        let t = Thought {
            thought: "```js\nconsole.log(1)\n```".into(),
            thought_number: 1,
            total_thoughts: 1,
            next_thought_needed: true,
            branch_id: Some("S1".into()),
            loop_id: None,
            is_revision: None,
            revises_thought: None,
            branch_from_thought: None,
        };
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"branchId\":\"S1\""));
        let back: Thought = serde_json::from_str(&json).unwrap();
        assert_eq!(back.thought_number, 1);
    }
}
