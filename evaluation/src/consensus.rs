//! Multi-expert consensus — weighted aggregation and disagreement detection.
//!
//! Each expert scores the same content independently. The verdicts that
//! survive (non-degraded) are combined into one [`EvaluationResult`]:
//! weighted means per numeric field, a confidence derived from the spread of
//! overall scores, and explicit records wherever experts disagree sharply.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EvaluationConfig;
use crate::model::{clamp_unit, union_dedup, Dimension, EvaluationDimensions, EvaluationResult};
use crate::stats;

/// `max − min` above which a field is recorded as a disagreement.
pub const DISAGREEMENT_SPREAD: f64 = 0.3;
/// Lower bound on consensus confidence.
pub const MIN_CONSENSUS_CONFIDENCE: f64 = 0.1;
/// Error tag when no expert produced a usable verdict.
pub const ALL_EXPERTS_FAILED: &str = "all_experts_failed";

/// Fields checked for disagreement, in reporting order.
const DISAGREEMENT_FIELDS: [ScoreField; 4] = [
    ScoreField::Overall,
    ScoreField::Dimension(Dimension::Relevance),
    ScoreField::Dimension(Dimension::Completeness),
    ScoreField::Dimension(Dimension::Accuracy),
];

/// A reviewer persona with a focus and a voting weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertProfile {
    pub name: String,
    pub focus_areas: Vec<String>,
    pub weight: f64,
}

impl ExpertProfile {
    pub fn new(name: &str, focus_areas: &[&str], weight: f64) -> Self {
        Self {
            name: name.to_string(),
            focus_areas: focus_areas.iter().map(|s| s.to_string()).collect(),
            weight,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("expert name must not be empty".to_string());
        }
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(format!(
                "expert '{}' weight must be > 0, got {}",
                self.name, self.weight
            ));
        }
        Ok(())
    }

    /// System prompt framing the grader as this expert.
    pub fn system_prompt(&self) -> String {
        format!(
            "You are a {} reviewing written work. Focus especially on: {}. \
             Score strictly and independently; do not assume other reviewers will catch problems.",
            self.name,
            self.focus_areas.join(", ")
        )
    }
}

/// The five canonical reviewers; clinical safety carries the most weight.
pub fn canonical_profiles() -> Vec<ExpertProfile> {
    vec![
        ExpertProfile::new(
            "senior scientist",
            &["scientific accuracy", "depth of analysis", "use of evidence"],
            1.0,
        ),
        ExpertProfile::new(
            "clinical safety reviewer",
            &["patient safety", "risk disclosure", "overstated claims"],
            1.2,
        ),
        ExpertProfile::new(
            "methodologist",
            &["study design", "reproducibility", "logical structure"],
            1.1,
        ),
        ExpertProfile::new(
            "statistician",
            &["quantitative claims", "uncertainty", "statistical validity"],
            0.9,
        ),
        ExpertProfile::new(
            "science communicator",
            &["clarity", "readability", "audience fit"],
            0.8,
        ),
    ]
}

/// One expert's accepted verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertVerdict {
    /// Position of the expert in the active profile list.
    pub profile_index: usize,
    pub expert: String,
    pub weight: f64,
    pub result: EvaluationResult,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
}

/// A numeric field of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreField {
    Overall,
    Dimension(Dimension),
}

impl ScoreField {
    pub fn value(self, result: &EvaluationResult) -> f64 {
        match self {
            Self::Overall => result.overall_score,
            Self::Dimension(d) => result.dimensions.get(d),
        }
    }
}

impl std::fmt::Display for ScoreField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overall => write!(f, "overall_score"),
            Self::Dimension(d) => write!(f, "{d}"),
        }
    }
}

/// Sharp split between two experts on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disagreement {
    pub field: String,
    pub low_scorer: String,
    pub high_scorer: String,
    pub low: f64,
    pub high: f64,
}

impl Disagreement {
    pub fn spread(&self) -> f64 {
        self.high - self.low
    }
}

/// Aggregated outcome of a consensus round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub result: EvaluationResult,
    pub confidence: f64,
    pub disagreements: Vec<Disagreement>,
    pub strengths: Vec<String>,
    pub concerns: Vec<String>,
    pub experts_succeeded: usize,
    pub experts_total: usize,
}

/// Combine expert verdicts into a consensus result.
///
/// Verdicts are re-ordered by `profile_index` first so the outcome never
/// depends on completion order.
pub fn aggregate(
    mut verdicts: Vec<ExpertVerdict>,
    experts_total: usize,
    iteration: u32,
    config: &EvaluationConfig,
) -> ConsensusOutcome {
    let threshold = config.quality_threshold;
    verdicts.retain(|v| v.weight.is_finite() && v.weight > 0.0);
    verdicts.sort_by_key(|v| v.profile_index);

    if verdicts.is_empty() {
        warn!(experts_total, "No expert produced a usable verdict");
        return ConsensusOutcome {
            result: EvaluationResult::zero(iteration, threshold)
                .with_metadata(crate::model::META_ERROR, ALL_EXPERTS_FAILED)
                .with_metadata("strategy", "multi_expert")
                .with_metadata("experts_total", experts_total as u64),
            confidence: 0.0,
            disagreements: Vec::new(),
            strengths: Vec::new(),
            concerns: Vec::new(),
            experts_succeeded: 0,
            experts_total,
        };
    }

    let total_weight: f64 = verdicts.iter().map(|v| v.weight).sum();
    let weighted = |field: ScoreField| -> f64 {
        verdicts
            .iter()
            .map(|v| field.value(&v.result) * v.weight)
            .sum::<f64>()
            / total_weight
    };

    let overall = weighted(ScoreField::Overall);
    let mut dimensions = EvaluationDimensions::default();
    for d in Dimension::ALL {
        dimensions.set(d, weighted(ScoreField::Dimension(d)));
    }

    let disagreements = detect_disagreements(&verdicts);
    if !disagreements.is_empty() {
        debug!(
            count = disagreements.len(),
            fields = ?disagreements.iter().map(|d| d.field.as_str()).collect::<Vec<_>>(),
            "Experts disagree"
        );
    }

    let overall_scores: Vec<f64> = verdicts.iter().map(|v| v.result.overall_score).collect();
    let confidence = consensus_confidence(&overall_scores);

    let suggestions = union_dedup(verdicts.iter().map(|v| v.result.suggestions.as_slice()));
    let strengths = union_dedup(verdicts.iter().map(|v| v.strengths.as_slice()));
    let concerns = union_dedup(verdicts.iter().map(|v| v.concerns.as_slice()));

    let experts: Vec<&str> = verdicts.iter().map(|v| v.expert.as_str()).collect();
    let result = EvaluationResult::scored(overall, dimensions, iteration, threshold)
        .with_suggestions(suggestions)
        .with_metadata("strategy", "multi_expert")
        .with_metadata("consensus_confidence", confidence)
        .with_metadata("experts_succeeded", verdicts.len() as u64)
        .with_metadata("experts_total", experts_total as u64)
        .with_metadata("experts", serde_json::json!(experts))
        .with_metadata("disagreements", serde_json::json!(disagreements))
        .with_metadata("strengths", serde_json::json!(strengths))
        .with_metadata("concerns", serde_json::json!(concerns));

    ConsensusOutcome {
        result,
        confidence,
        disagreements,
        strengths,
        concerns,
        experts_succeeded: verdicts.len(),
        experts_total,
    }
}

/// `max(0.1, 1 − 4·variance)` over overall scores (population variance).
pub fn consensus_confidence(overall_scores: &[f64]) -> f64 {
    let variance = stats::population_variance(overall_scores);
    clamp_unit((1.0 - 4.0 * variance).max(MIN_CONSENSUS_CONFIDENCE))
}

/// Fields whose `max − min` across experts exceeds [`DISAGREEMENT_SPREAD`].
///
/// Ties for lowest/highest keep the expert that comes first.
pub fn detect_disagreements(verdicts: &[ExpertVerdict]) -> Vec<Disagreement> {
    let mut out = Vec::new();
    for field in DISAGREEMENT_FIELDS {
        let Some(first) = verdicts.first() else {
            break;
        };
        let mut low = first;
        let mut high = first;
        for v in &verdicts[1..] {
            let value = field.value(&v.result);
            if value < field.value(&low.result) {
                low = v;
            }
            if value > field.value(&high.result) {
                high = v;
            }
        }
        let (lo, hi) = (field.value(&low.result), field.value(&high.result));
        if hi - lo > DISAGREEMENT_SPREAD {
            out.push(Disagreement {
                field: field.to_string(),
                low_scorer: low.expert.clone(),
                high_scorer: high.expert.clone(),
                low: lo,
                high: hi,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(index: usize, name: &str, weight: f64, overall: f64) -> ExpertVerdict {
        ExpertVerdict {
            profile_index: index,
            expert: name.to_string(),
            weight,
            result: EvaluationResult::scored(overall, EvaluationDimensions::uniform(overall), 0, 0.8),
            strengths: Vec::new(),
            concerns: Vec::new(),
        }
    }

    #[test]
    fn test_canonical_profiles() {
        let profiles = canonical_profiles();
        let weights: Vec<f64> = profiles.iter().map(|p| p.weight).collect();
        assert_eq!(weights, vec![1.0, 1.2, 1.1, 0.9, 0.8]);
        assert!(profiles.iter().all(|p| p.validate().is_ok()));
        assert_eq!(profiles[1].name, "clinical safety reviewer");
    }

    #[test]
    fn test_zero_weight_profile_invalid() {
        assert!(ExpertProfile::new("x", &[], 0.0).validate().is_err());
    }

    #[test]
    fn test_weighted_consensus() {
        let outcome = aggregate(
            vec![verdict(0, "a", 1.0, 0.6), verdict(1, "b", 3.0, 1.0)],
            2,
            0,
            &EvaluationConfig::default(),
        );
        assert!((outcome.result.overall_score - 0.9).abs() < 1e-9);
        assert!((outcome.result.dimensions.clarity - 0.9).abs() < 1e-9);
        assert!(!outcome.result.needs_revision);
    }

    #[test]
    fn test_all_failed_is_zero_with_error_tag() {
        let outcome = aggregate(Vec::new(), 5, 1, &EvaluationConfig::default());
        assert_eq!(outcome.result.overall_score, 0.0);
        assert!(outcome.result.needs_revision);
        assert_eq!(outcome.result.error_tag(), Some(ALL_EXPERTS_FAILED));
        assert_eq!(outcome.experts_succeeded, 0);
    }

    #[test]
    fn test_disagreement_recorded_with_scorers() {
        let outcome = aggregate(
            vec![verdict(0, "optimist", 1.0, 0.9), verdict(1, "pessimist", 1.0, 0.5)],
            2,
            0,
            &EvaluationConfig::default(),
        );
        let overall = outcome
            .disagreements
            .iter()
            .find(|d| d.field == "overall_score")
            .expect("overall disagreement");
        assert_eq!(overall.high, 0.9);
        assert_eq!(overall.low, 0.5);
        assert_eq!(overall.high_scorer, "optimist");
        assert_eq!(overall.low_scorer, "pessimist");
        // overall, relevance, completeness, accuracy
        assert_eq!(outcome.disagreements.len(), 4);
    }

    #[test]
    fn test_no_disagreement_below_spread() {
        let verdicts = vec![verdict(0, "a", 1.0, 0.75), verdict(1, "b", 1.0, 0.5)];
        assert!(detect_disagreements(&verdicts).is_empty());
    }

    #[test]
    fn test_confidence_floor_and_identity() {
        assert!((consensus_confidence(&[0.7, 0.7, 0.7]) - 1.0).abs() < 1e-9);
        assert!((consensus_confidence(&[0.0, 1.0]) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_aggregation_independent_of_completion_order() {
        let mut a = verdict(0, "first", 1.0, 0.6);
        a.result.suggestions = vec!["Add data".into()];
        let mut b = verdict(1, "second", 1.0, 0.8);
        b.result.suggestions = vec!["add data".into(), "Cite sources".into()];

        let forward = aggregate(vec![a.clone(), b.clone()], 2, 0, &EvaluationConfig::default());
        let reversed = aggregate(vec![b, a], 2, 0, &EvaluationConfig::default());
        assert_eq!(forward.result, reversed.result);
        assert_eq!(forward.result.suggestions, vec!["Add data", "Cite sources"]);
    }
}
