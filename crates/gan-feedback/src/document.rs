use crate::sanitize::sanitize;
use gan_core::{AuditReview, IterationRecord, Verdict};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRow {
    pub issue: String,
    pub severity: String,
    pub location: String,
    pub proof: String,
    pub fix_summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceabilityRow {
    pub acceptance_criterion: String,
    pub implementation: String,
    pub test_files: String,
    pub coverage_status: String,
}

/// The full structured feedback document (§4.J), sanitized on construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDocument {
    pub ship: bool,
    pub risk_level: RiskLevel,
    pub verdict_bullets: Vec<String>,
    pub evidence: Vec<EvidenceRow>,
    pub proposed_diffs: Vec<String>,
    pub reproduction_commands: Vec<String>,
    pub traceability: Vec<TraceabilityRow>,
    pub follow_ups: Vec<String>,
}

fn risk_level(review: &AuditReview, critical_count: usize) -> RiskLevel {
    if critical_count > 0 || review.overall < 70 {
        RiskLevel::High
    } else if review.overall < 85 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn verdict_bullets(review: &AuditReview, critical_count: usize, risk: RiskLevel) -> Vec<String> {
    let mut bullets = Vec::new();
    let ship = matches!(review.verdict, Verdict::Pass);
    bullets.push(format!("{} (overall {})", if ship { "Ship" } else { "No-ship" }, review.overall));

    let mut sorted = review.dimensions.clone();
    sorted.sort_by(|a, b| b.score.cmp(&a.score));
    if let Some(strongest) = sorted.first() {
        bullets.push(format!("Strongest dimension: {} ({})", strongest.name, strongest.score));
    }
    if let Some(weakest) = sorted.last() {
        bullets.push(format!("Weakest dimension: {} ({})", weakest.name, weakest.score));
    }
    bullets.push(format!("Critical issues: {critical_count}"));
    bullets.push(format!("Risk level: {risk:?}"));
    bullets
}

fn evidence_rows(review: &AuditReview) -> Vec<EvidenceRow> {
    review
        .review
        .inline
        .iter()
        .map(|c| EvidenceRow {
            issue: c.comment.clone(),
            severity: if c.critical { "critical".into() } else { "normal".into() },
            location: format!("{}:{}", c.path, c.line),
            proof: format!("see {}:{} as flagged by the audit", c.path, c.line),
            fix_summary: format!("address: {}", c.comment),
        })
        .collect()
}

fn proposed_diffs(review: &AuditReview) -> Vec<String> {
    review
        .review
        .inline
        .iter()
        .filter(|c| c.critical)
        .map(|c| format!("--- a/{0}\n+++ b/{0}\n@@ line {1} @@\n- // TODO: {2}\n+ // fixed: {2}\n", c.path, c.line, c.comment))
        .collect()
}

fn reproduction_commands(review: &AuditReview) -> Vec<String> {
    review
        .review
        .inline
        .iter()
        .map(|c| format!("sed -n '{0}p' {1}", c.line, c.path))
        .collect()
}

fn traceability_rows(review: &AuditReview) -> Vec<TraceabilityRow> {
    review
        .dimensions
        .iter()
        .map(|d| TraceabilityRow {
            acceptance_criterion: d.name.clone(),
            implementation: "see review summary".into(),
            test_files: "n/a".into(),
            coverage_status: if d.score >= 70 { "covered".into() } else { "gap".into() },
        })
        .collect()
}

fn follow_ups(review: &AuditReview) -> Vec<String> {
    let mut critical: Vec<_> = review.review.inline.iter().filter(|c| c.critical).collect();
    let mut rest: Vec<_> = review.review.inline.iter().filter(|c| !c.critical).collect();
    critical.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));
    rest.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));
    critical
        .into_iter()
        .chain(rest)
        .map(|c| format!("Fix: {} ({}:{})", c.comment, c.path, c.line))
        .collect()
}

/// Pure function from `(review, iteration history)` to a sanitized [`FeedbackDocument`].
/// `history` is accepted for the traceability/evidence surface even though the current
/// implementation derives everything from `review` alone; the parameter keeps the signature
/// stable as follow-on work (cross-iteration evidence) lands.
pub fn build_feedback(review: &AuditReview, _history: &[IterationRecord]) -> FeedbackDocument {
    let critical_count = review.review.inline.iter().filter(|c| c.critical).count();
    let risk = risk_level(review, critical_count);

    let doc = FeedbackDocument {
        ship: matches!(review.verdict, Verdict::Pass),
        risk_level: risk,
        verdict_bullets: verdict_bullets(review, critical_count, risk),
        evidence: evidence_rows(review),
        proposed_diffs: proposed_diffs(review),
        reproduction_commands: reproduction_commands(review),
        traceability: traceability_rows(review),
        follow_ups: follow_ups(review),
    };

    sanitize_document(doc)
}

fn sanitize_document(mut doc: FeedbackDocument) -> FeedbackDocument {
    doc.verdict_bullets = doc.verdict_bullets.iter().map(|s| sanitize(s)).collect();
    for row in &mut doc.evidence {
        row.issue = sanitize(&row.issue);
        row.location = sanitize(&row.location);
        row.proof = sanitize(&row.proof);
        row.fix_summary = sanitize(&row.fix_summary);
    }
    doc.proposed_diffs = doc.proposed_diffs.iter().map(|s| sanitize(s)).collect();
    doc.reproduction_commands = doc.reproduction_commands.iter().map(|s| sanitize(s)).collect();
    doc.follow_ups = doc.follow_ups.iter().map(|s| sanitize(s)).collect();
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use gan_core::{DimensionScore, InlineComment, Review};

    fn review_with(overall: u8, verdict: Verdict, inline: Vec<InlineComment>) -> AuditReview {
        AuditReview {
            overall,
            verdict,
            dimensions: vec![
                DimensionScore { name: "Correctness".into(), score: 80 },
                DimensionScore { name: "Security".into(), score: 60 },
            ],
            review: Review { summary: "summary".into(), inline },
            judge_cards: vec![],
        }
    }

    #[test]
    fn pass_verdict_ships() {
        let review = review_with(96, Verdict::Pass, vec![]);
        let doc = build_feedback(&review, &[]);
        assert!(doc.ship);
        assert_eq!(doc.risk_level, RiskLevel::Low);
    }

    #[test]
    fn critical_comment_forces_high_risk_and_no_ship() {
        let review = review_with(
            90,
            Verdict::Revise,
            vec![InlineComment {
                path: "src/auth.rs".into(),
                line: 42,
                comment: "hardcoded credential".into(),
                critical: true,
            }],
        );
        let doc = build_feedback(&review, &[]);
        assert!(!doc.ship);
        assert_eq!(doc.risk_level, RiskLevel::High);
        assert_eq!(doc.evidence.len(), 1);
        assert_eq!(doc.evidence[0].severity, "critical");
    }

    #[test]
    fn low_overall_score_is_high_risk_even_without_critical_comments() {
        let review = review_with(50, Verdict::Reject, vec![]);
        let doc = build_feedback(&review, &[]);
        assert_eq!(doc.risk_level, RiskLevel::High);
    }

    #[test]
    fn follow_ups_list_critical_comments_before_normal_ones() {
        let review = review_with(
            80,
            Verdict::Revise,
            vec![
                InlineComment { path: "b.rs".into(), line: 1, comment: "style nit".into(), critical: false },
                InlineComment { path: "a.rs".into(), line: 2, comment: "sql injection".into(), critical: true },
            ],
        );
        let doc = build_feedback(&review, &[]);
        assert!(doc.follow_ups[0].contains("sql injection"));
    }

    #[test]
    fn traceability_flags_dimensions_below_seventy_as_gaps() {
        let review = review_with(80, Verdict::Revise, vec![]);
        let doc = build_feedback(&review, &[]);
        let security_row = doc.traceability.iter().find(|r| r.acceptance_criterion == "Security").unwrap();
        assert_eq!(security_row.coverage_status, "gap");
    }

    #[test]
    fn output_is_sanitized_of_emails_and_secrets() {
        let review = review_with(
            60,
            Verdict::Reject,
            vec![InlineComment {
                path: "config.rs".into(),
                line: 5,
                comment: "leaked sk-abcdefghijklmnopqrstuvwxyz and jane@example.com".into(),
                critical: true,
            }],
        );
        let doc = build_feedback(&review, &[]);
        let combined = doc.evidence[0].issue.clone();
        assert!(!combined.contains("sk-abcdefghijklmnopqrstuvwxyz"));
        assert!(!combined.contains("jane@example.com"));
    }
}
