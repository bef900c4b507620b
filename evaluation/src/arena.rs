//! Adversarial arena state machine — critic attacks, generator defends.
//!
//! The session owns the round history and the stop policy; the LLM calls
//! that produce criticisms and rewrites live with the caller, which feeds
//! their outcomes back through [`ArenaSession::record_attack`] and
//! [`ArenaSession::record_defense`].
//!
//! ```text
//! Attacking ──► Defending ──► Attacking ──► …
//!     │              │
//!     ├─► Converged  └─► Exhausted (generator failed)
//!     └─► Exhausted (final round)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::critique::{self, Criticism, SeverityWeights};
use crate::model::{union_dedup, EvaluationResult, META_ERROR};

/// Phase of an arena session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArenaPhase {
    /// Critic is attacking the current content.
    Attacking,
    /// Generator is rewriting the content to address the criticisms.
    Defending,
    /// Robustness stopped improving.
    Converged,
    /// Round budget spent, generator failed, or the run was cancelled.
    Exhausted,
}

impl ArenaPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::Exhausted)
    }

    pub fn valid_transitions(self) -> &'static [ArenaPhase] {
        match self {
            Self::Attacking => &[Self::Defending, Self::Converged, Self::Exhausted],
            Self::Defending => &[Self::Attacking, Self::Exhausted],
            Self::Converged | Self::Exhausted => &[],
        }
    }
}

impl std::fmt::Display for ArenaPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attacking => write!(f, "attacking"),
            Self::Defending => write!(f, "defending"),
            Self::Converged => write!(f, "converged"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Arena tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub max_rounds: u32,
    /// Minimum robustness gain between rounds to keep going.
    pub improvement_threshold: f64,
    /// `|Δ|` below which a delta counts towards convergence.
    pub convergence_epsilon: f64,
    pub severity_weights: SeverityWeights,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            improvement_threshold: 0.1,
            convergence_epsilon: 0.05,
            severity_weights: SeverityWeights::default(),
        }
    }
}

impl ArenaConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_rounds == 0 {
            return Err("arena max_rounds must be > 0".to_string());
        }
        if !self.improvement_threshold.is_finite() || self.improvement_threshold < 0.0 {
            return Err(format!(
                "improvement_threshold must be non-negative, got {}",
                self.improvement_threshold
            ));
        }
        if !self.convergence_epsilon.is_finite() || self.convergence_epsilon < 0.0 {
            return Err(format!(
                "convergence_epsilon must be non-negative, got {}",
                self.convergence_epsilon
            ));
        }
        self.severity_weights.validate()
    }
}

/// One critic pass, plus the generator's rewrite if one followed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdversarialRound {
    pub round_index: u32,
    pub criticisms: Vec<Criticism>,
    pub robustness_score: f64,
    /// Content the critic attacked.
    pub content: String,
    pub improved_content: Option<String>,
}

/// What the caller should do after an attack is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaStep {
    /// Run the generator against the latest criticisms.
    Defend,
    /// Session ended; read the outcome.
    Finished(ArenaPhase),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaTransition {
    pub from: ArenaPhase,
    pub to: ArenaPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid arena operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("arena in phase {phase}: {reason}")]
pub struct ArenaError {
    pub phase: ArenaPhase,
    pub reason: String,
}

/// Summary of a finished arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAssessment {
    /// Successive robustness deltas.
    pub improvement_trend: Vec<f64>,
    pub top_categories: Vec<String>,
    /// Last two deltas both below the convergence epsilon.
    pub convergence_achieved: bool,
    pub best_robustness_score: f64,
    pub rounds_completed: u32,
    pub terminal_phase: ArenaPhase,
}

/// Number of criticism categories reported in the final assessment.
const TOP_CATEGORY_LIMIT: usize = 3;

/// Arena session tracking rounds, the best candidate, and phase history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaSession {
    pub config: ArenaConfig,
    pub phase: ArenaPhase,
    pub rounds: Vec<AdversarialRound>,
    pub transitions: Vec<ArenaTransition>,
    original_content: String,
    current_content: String,
    best_round: Option<usize>,
}

impl ArenaSession {
    pub fn new(content: &str, config: ArenaConfig) -> Self {
        Self {
            config,
            phase: ArenaPhase::Attacking,
            rounds: Vec::new(),
            transitions: Vec::new(),
            original_content: content.to_string(),
            current_content: content.to_string(),
            best_round: None,
        }
    }

    /// Content the critic should attack next.
    pub fn current_content(&self) -> &str {
        &self.current_content
    }

    pub fn original_content(&self) -> &str {
        &self.original_content
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn rounds_completed(&self) -> u32 {
        self.rounds.len() as u32
    }

    /// Index of the next round to run.
    pub fn next_round(&self) -> u32 {
        self.rounds.len() as u32
    }

    /// Criticisms of the most recent round.
    pub fn latest_criticisms(&self) -> &[Criticism] {
        self.rounds
            .last()
            .map(|r| r.criticisms.as_slice())
            .unwrap_or_default()
    }

    pub fn best(&self) -> Option<&AdversarialRound> {
        self.best_round.and_then(|i| self.rounds.get(i))
    }

    pub fn best_content(&self) -> &str {
        self.best()
            .map(|r| r.content.as_str())
            .unwrap_or(&self.original_content)
    }

    pub fn best_robustness(&self) -> f64 {
        self.best().map(|r| r.robustness_score).unwrap_or(0.0)
    }

    fn transition(&mut self, to: ArenaPhase, reason: &str) -> Result<(), ArenaError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(ArenaError {
                phase: self.phase,
                reason: format!("cannot move to {to}"),
            });
        }
        self.transitions.push(ArenaTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Record the critic's findings for the current content and decide the next step.
    pub fn record_attack(&mut self, criticisms: Vec<Criticism>) -> Result<ArenaStep, ArenaError> {
        if self.phase != ArenaPhase::Attacking {
            return Err(ArenaError {
                phase: self.phase,
                reason: "attack recorded outside the attacking phase".to_string(),
            });
        }

        let round_index = self.next_round();
        let robustness = critique::robustness_score(&criticisms, &self.config.severity_weights);
        let previous = self.rounds.last().map(|r| r.robustness_score);

        self.rounds.push(AdversarialRound {
            round_index,
            criticisms,
            robustness_score: robustness,
            content: self.current_content.clone(),
            improved_content: None,
        });
        if robustness > self.best_robustness() || self.best_round.is_none() {
            self.best_round = Some(self.rounds.len() - 1);
        }
        debug!(
            round = round_index,
            robustness,
            best = self.best_robustness(),
            criticisms = self.latest_criticisms().len(),
            "Arena round scored"
        );

        if let Some(prev) = previous {
            if robustness - prev < self.config.improvement_threshold {
                self.transition(
                    ArenaPhase::Converged,
                    &format!("robustness {prev:.3} -> {robustness:.3} below improvement threshold"),
                )?;
                return Ok(ArenaStep::Finished(ArenaPhase::Converged));
            }
        }

        if round_index + 1 >= self.config.max_rounds {
            self.transition(ArenaPhase::Exhausted, "round budget spent")?;
            return Ok(ArenaStep::Finished(ArenaPhase::Exhausted));
        }

        self.transition(ArenaPhase::Defending, "criticisms recorded")?;
        Ok(ArenaStep::Defend)
    }

    /// Record the generator's rewrite; the next attack targets it.
    pub fn record_defense(&mut self, improved: &str) -> Result<(), ArenaError> {
        if self.phase != ArenaPhase::Defending {
            return Err(ArenaError {
                phase: self.phase,
                reason: "defense recorded outside the defending phase".to_string(),
            });
        }
        if let Some(last) = self.rounds.last_mut() {
            last.improved_content = Some(improved.to_string());
        }
        self.current_content = improved.to_string();
        self.transition(ArenaPhase::Attacking, "content rewritten")
    }

    /// End early (generator failure, cancellation), keeping the best so far.
    pub fn abort(&mut self, reason: &str) {
        if !self.phase.is_terminal() {
            // Attacking and Defending can both reach Exhausted.
            let _ = self.transition(ArenaPhase::Exhausted, reason);
        }
    }

    pub fn final_assessment(&self) -> FinalAssessment {
        let improvement_trend: Vec<f64> = self
            .rounds
            .windows(2)
            .map(|w| w[1].robustness_score - w[0].robustness_score)
            .collect();
        let eps = self.config.convergence_epsilon;
        let convergence_achieved = improvement_trend.len() >= 2
            && improvement_trend[improvement_trend.len() - 2..]
                .iter()
                .all(|d| d.abs() < eps);

        FinalAssessment {
            top_categories: critique::top_categories(
                self.rounds.iter().flat_map(|r| r.criticisms.iter()),
                TOP_CATEGORY_LIMIT,
            ),
            improvement_trend,
            convergence_achieved,
            best_robustness_score: self.best_robustness(),
            rounds_completed: self.rounds_completed(),
            terminal_phase: self.phase,
        }
    }

    /// Project the arena outcome onto the common result shape.
    pub fn into_evaluation_result(self, iteration: u32, threshold: f64) -> EvaluationResult {
        let assessment = self.final_assessment();
        let Some(best) = self.best() else {
            return EvaluationResult::zero(iteration, threshold)
                .with_metadata(META_ERROR, "no_rounds")
                .with_metadata("strategy", "adversarial")
                .with_metadata("arena_phase", self.phase.to_string());
        };

        let weights = &self.config.severity_weights;
        let dimensions = critique::dimension_robustness(&best.criticisms, weights);
        let suggestions: Vec<String> = best
            .criticisms
            .iter()
            .map(|c| c.actionable_text().to_string())
            .collect();
        let suggestions = union_dedup([suggestions.as_slice()]);

        let mut result =
            EvaluationResult::scored(best.robustness_score, dimensions, iteration, threshold)
                .with_suggestions(suggestions)
                .with_metadata("strategy", "adversarial")
                .with_metadata("arena_phase", self.phase.to_string())
                .with_metadata("rounds_completed", u64::from(assessment.rounds_completed))
                .with_metadata("best_round", u64::from(best.round_index))
                .with_metadata("final_assessment", serde_json::json!(assessment));
        if best.content != self.original_content {
            result = result.with_refined_content(best.content.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critique::Severity;

    fn crits(high: usize, medium: usize) -> Vec<Criticism> {
        let mut out = Vec::new();
        for i in 0..high {
            out.push(Criticism::new("accuracy", &format!("high {i}"), Severity::High));
        }
        for i in 0..medium {
            out.push(
                Criticism::new("clarity", &format!("medium {i}"), Severity::Medium)
                    .with_suggestion("shorten sentences"),
            );
        }
        out
    }

    #[test]
    fn test_small_gain_converges_after_second_round() {
        let mut arena = ArenaSession::new("draft", ArenaConfig::default());
        // 1 - 0.3 - 0.1*2 = 0.5
        assert_eq!(arena.record_attack(crits(1, 2)).unwrap(), ArenaStep::Defend);
        arena.record_defense("draft v2").unwrap();
        // 1 - 0.3 - 0.1 - 0.05 = 0.55
        let mut second = crits(1, 1);
        second.push(Criticism::new("style", "minor", Severity::Low));
        let step = arena.record_attack(second).unwrap();
        assert_eq!(step, ArenaStep::Finished(ArenaPhase::Converged));
        assert_eq!(arena.rounds_completed(), 2);
        assert!((arena.best_robustness() - 0.55).abs() < 1e-9);
        assert_eq!(arena.best_content(), "draft v2");
    }

    #[test]
    fn test_final_round_ends_exhausted() {
        let config = ArenaConfig {
            max_rounds: 2,
            ..ArenaConfig::default()
        };
        let mut arena = ArenaSession::new("draft", config);
        assert_eq!(arena.record_attack(crits(2, 0)).unwrap(), ArenaStep::Defend);
        arena.record_defense("draft v2").unwrap();
        let step = arena.record_attack(crits(0, 1)).unwrap();
        assert_eq!(step, ArenaStep::Finished(ArenaPhase::Exhausted));
        assert!(arena.is_complete());
    }

    #[test]
    fn test_ties_keep_earlier_best() {
        let mut arena = ArenaSession::new("v1", ArenaConfig::default());
        arena.record_attack(crits(1, 0)).unwrap();
        arena.record_defense("v2").unwrap();
        arena.record_attack(crits(1, 0)).unwrap();
        assert_eq!(arena.best_content(), "v1");
        assert_eq!(arena.best().map(|r| r.round_index), Some(0));
    }

    #[test]
    fn test_regression_stops_and_keeps_best() {
        let mut arena = ArenaSession::new("v1", ArenaConfig::default());
        arena.record_attack(crits(0, 1)).unwrap(); // 0.9
        arena.record_defense("v2").unwrap();
        let step = arena.record_attack(crits(2, 0)).unwrap(); // 0.4
        assert_eq!(step, ArenaStep::Finished(ArenaPhase::Converged));
        assert_eq!(arena.best_content(), "v1");
    }

    #[test]
    fn test_attack_rejected_while_defending() {
        let mut arena = ArenaSession::new("v1", ArenaConfig::default());
        arena.record_attack(crits(1, 0)).unwrap();
        let err = arena.record_attack(crits(0, 0)).unwrap_err();
        assert_eq!(err.phase, ArenaPhase::Defending);
    }

    #[test]
    fn test_abort_keeps_best_so_far() {
        let mut arena = ArenaSession::new("v1", ArenaConfig::default());
        arena.record_attack(crits(1, 0)).unwrap();
        arena.abort("generator failed");
        assert_eq!(arena.phase, ArenaPhase::Exhausted);
        let result = arena.into_evaluation_result(0, 0.8);
        assert!((result.overall_score - 0.7).abs() < 1e-9);
        assert!(result.refined_content.is_none());
    }

    #[test]
    fn test_convergence_achieved_needs_two_small_deltas() {
        let config = ArenaConfig {
            max_rounds: 5,
            improvement_threshold: 0.0,
            ..ArenaConfig::default()
        };
        let mut arena = ArenaSession::new("v1", config);
        arena.record_attack(crits(1, 2)).unwrap(); // 0.5
        arena.record_defense("v2").unwrap();
        arena.record_attack(crits(1, 1)).unwrap(); // 0.6
        arena.record_defense("v3").unwrap();
        let mut third = crits(1, 1);
        third.retain(|c| c.severity == Severity::High);
        third.push(Criticism::new("style", "x", Severity::Low));
        third.push(Criticism::new("style", "y", Severity::Low));
        arena.record_attack(third).unwrap(); // 0.6 (delta 0)
        let assessment = arena.final_assessment();
        assert_eq!(assessment.improvement_trend.len(), 2);
        // deltas ~0.1 then ~0.0: only the last is small
        assert!(!assessment.convergence_achieved);
    }

    #[test]
    fn test_result_projection() {
        let mut arena = ArenaSession::new("v1", ArenaConfig::default());
        arena.record_attack(crits(1, 1)).unwrap(); // 0.6
        arena.record_defense("v2").unwrap();
        arena.record_attack(crits(0, 1)).unwrap(); // 0.9
        arena.record_defense("v3").unwrap();
        arena.record_attack(crits(0, 1)).unwrap(); // 0.9, converged

        let result = arena.into_evaluation_result(2, 0.8);
        assert!((result.overall_score - 0.9).abs() < 1e-9);
        assert!(!result.needs_revision);
        assert_eq!(result.refined_content.as_deref(), Some("v2"));
        assert!((result.dimensions.clarity - 0.9).abs() < 1e-9);
        assert_eq!(result.dimensions.accuracy, 1.0);
        assert_eq!(result.suggestions, vec!["shorten sentences".to_string()]);
        assert_eq!(result.metadata["arena_phase"], "converged");
    }

    #[test]
    fn test_no_rounds_projects_to_zero() {
        let mut arena = ArenaSession::new("v1", ArenaConfig::default());
        arena.abort("cancelled");
        let result = arena.into_evaluation_result(0, 0.8);
        assert_eq!(result.overall_score, 0.0);
        assert_eq!(result.error_tag(), Some("no_rounds"));
    }
}
