use gan_core::{CompletionResult, CompletionStatus, CompletionTier, KillSwitchHit};

/// Loop thresholds for the kill switches that aren't tier-driven.
#[derive(Debug, Clone, Copy)]
pub struct KillSwitchConfig {
    pub max_iterations: u32,
    pub stagnation_start_loop: u32,
    pub critical_persistence_start_loop: u32,
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        KillSwitchConfig {
            max_iterations: 25,
            stagnation_start_loop: 10,
            critical_persistence_start_loop: 15,
        }
    }
}

/// `(score, loop) -> {complete, in-progress, terminated}`. A pure function of its inputs:
/// identical `(score, loop_count, tiers, stagnant, has_critical_comment, kill_switches)`
/// always produces an identical `CompletionResult` (§8 round-trip law).
pub fn evaluate(
    score: u8,
    loop_count: u32,
    tiers: &[CompletionTier],
    stagnant: bool,
    has_critical_comment: bool,
    kill_switches: &KillSwitchConfig,
) -> CompletionResult {
    for tier in tiers {
        if score >= tier.score_threshold && loop_count >= tier.iteration_threshold {
            return CompletionResult {
                status: CompletionStatus::Completed,
                reason: format!("{} tier reached (score={score}, loop={loop_count})", tier.name),
                next_thought_needed: false,
                tier: Some(tier.clone()),
                kill_switch: None,
            };
        }
    }

    if loop_count >= kill_switches.max_iterations {
        return terminated(
            "Hard Stop",
            format!("loop {loop_count} reached maxIterations {}", kill_switches.max_iterations),
        );
    }

    if loop_count >= kill_switches.stagnation_start_loop && stagnant {
        return terminated(
            "Stagnation",
            format!("candidate content unchanged across the iteration window at loop {loop_count}"),
        );
    }

    if has_critical_comment && loop_count >= kill_switches.critical_persistence_start_loop {
        return terminated(
            "Critical Persistence",
            format!("a critical inline comment persisted through loop {loop_count}"),
        );
    }

    CompletionResult {
        status: CompletionStatus::InProgress,
        reason: format!("no completion tier or kill switch matched (score={score}, loop={loop_count})"),
        next_thought_needed: true,
        tier: None,
        kill_switch: None,
    }
}

fn terminated(name: &str, condition: String) -> CompletionResult {
    CompletionResult {
        status: CompletionStatus::Terminated,
        reason: condition.clone(),
        next_thought_needed: false,
        tier: None,
        kill_switch: Some(KillSwitchHit { name: name.to_string(), condition }),
    }
}
