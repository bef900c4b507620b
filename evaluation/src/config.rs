//! Per-run evaluation configuration and dimension weighting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{clamp_unit, Dimension, EvaluationDimensions};

/// Default score at which a run terminates successfully.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.8;
/// Default iteration budget per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;
/// Best score at or above which an exhausted run goes to human review.
pub const DEFAULT_REVIEW_THRESHOLD: f64 = 0.7;
/// Dimensions below this score are sent to the suggestion prompt.
pub const DEFAULT_SUGGESTION_CUTOFF: f64 = 0.7;
/// Strict mode caps the overall score at `min(dimension) + STRICT_MODE_MARGIN`.
pub const STRICT_MODE_MARGIN: f64 = 0.25;

/// Default weights: relevance .25, completeness .20, accuracy .20,
/// clarity .15, coherence .15, scientific_rigor .05.
pub fn default_dimension_weights() -> BTreeMap<Dimension, f64> {
    BTreeMap::from([
        (Dimension::Relevance, 0.25),
        (Dimension::Completeness, 0.20),
        (Dimension::Accuracy, 0.20),
        (Dimension::Clarity, 0.15),
        (Dimension::Coherence, 0.15),
        (Dimension::ScientificRigor, 0.05),
    ])
}

/// Which evaluation strategy a run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    RuleBased,
    LlmGraded,
    MultiExpert,
    Adversarial,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        Self::RuleBased,
        Self::LlmGraded,
        Self::MultiExpert,
        Self::Adversarial,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RuleBased => "rule_based",
            Self::LlmGraded => "llm_graded",
            Self::MultiExpert => "multi_expert",
            Self::Adversarial => "adversarial",
        }
    }

    /// Whether this strategy calls the generation port to score content.
    pub fn uses_llm(self) -> bool {
        !matches!(self, Self::RuleBased)
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown strategy '{s}' (expected one of: rule_based, llm_graded, multi_expert, adversarial)"
                )
            })
    }
}

/// Immutable configuration for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub quality_threshold: f64,
    pub max_iterations: u32,
    pub dimension_weights: BTreeMap<Dimension, f64>,
    pub strict_mode: bool,
    pub review_threshold: f64,
    pub suggestion_cutoff: f64,
    /// Let an equal-scoring later candidate replace the tracked best.
    pub replace_best_on_tie: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            dimension_weights: default_dimension_weights(),
            strict_mode: false,
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            suggestion_cutoff: DEFAULT_SUGGESTION_CUTOFF,
            replace_best_on_tie: false,
        }
    }
}

impl EvaluationConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Whether a candidate scoring `score` should replace one scoring `best`.
    pub fn improves_on(&self, score: f64, best: f64) -> bool {
        if self.replace_best_on_tie {
            score >= best
        } else {
            score > best
        }
    }

    /// Validate the config; return an error string if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(format!(
                "quality_threshold must be in [0, 1], got {}",
                self.quality_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.review_threshold) {
            return Err(format!(
                "review_threshold must be in [0, 1], got {}",
                self.review_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.suggestion_cutoff) {
            return Err(format!(
                "suggestion_cutoff must be in [0, 1], got {}",
                self.suggestion_cutoff
            ));
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be > 0".to_string());
        }
        for (dimension, weight) in &self.dimension_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(format!(
                    "weight for {} must be a non-negative number, got {}",
                    dimension, weight
                ));
            }
        }
        Ok(())
    }

    /// Weights actually used for scoring: the configured subset, or the
    /// defaults when nothing positive is configured.
    fn effective_weights(&self) -> BTreeMap<Dimension, f64> {
        let total: f64 = self
            .dimension_weights
            .values()
            .filter(|w| w.is_finite() && **w > 0.0)
            .sum();
        if total > 0.0 {
            self.dimension_weights.clone()
        } else {
            default_dimension_weights()
        }
    }

    /// Weighted sum renormalized over the configured dimensions.
    pub fn weighted_score(&self, dimensions: &EvaluationDimensions) -> f64 {
        let weights = self.effective_weights();
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (dimension, weight) in weights {
            if !weight.is_finite() || weight <= 0.0 {
                continue;
            }
            weighted += dimensions.get(dimension) * weight;
            total += weight;
        }
        if total == 0.0 {
            return 0.0;
        }
        clamp_unit(weighted / total)
    }

    /// Overall score for a set of dimensions, with the strict-mode cap applied.
    pub fn overall_score(&self, dimensions: &EvaluationDimensions) -> f64 {
        let score = self.weighted_score(dimensions);
        if self.strict_mode {
            score.min(dimensions.min() + STRICT_MODE_MARGIN)
        } else {
            score
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        EvaluationConfig::default()
            .validate()
            .expect("default config should be valid");
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let total: f64 = default_dimension_weights().values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let cfg = EvaluationConfig::default().with_threshold(1.2);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let cfg = EvaluationConfig::default().with_max_iterations(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut cfg = EvaluationConfig::default();
        cfg.dimension_weights.insert(Dimension::Clarity, -0.1);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_weighted_score_renormalizes_subset() {
        let mut cfg = EvaluationConfig::default();
        cfg.dimension_weights = BTreeMap::from([
            (Dimension::Relevance, 0.5),
            (Dimension::Accuracy, 0.5),
        ]);
        let dims = EvaluationDimensions::new(1.0, 0.0, 0.5, 0.0, 0.0, 0.0);
        assert!((cfg.weighted_score(&dims) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_weights_fall_back_to_defaults() {
        let mut cfg = EvaluationConfig::default();
        cfg.dimension_weights.clear();
        let dims = EvaluationDimensions::uniform(0.6);
        assert!((cfg.weighted_score(&dims) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_strict_mode_caps_overall() {
        let dims = EvaluationDimensions::new(1.0, 1.0, 1.0, 1.0, 1.0, 0.2);
        let lenient = EvaluationConfig::default();
        let strict = EvaluationConfig::default().with_strict_mode(true);
        assert!(lenient.overall_score(&dims) > 0.9);
        assert!((strict.overall_score(&dims) - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_improves_on_tie_break() {
        let strict = EvaluationConfig::default();
        assert!(!strict.improves_on(0.6, 0.6));
        assert!(strict.improves_on(0.61, 0.6));
        let lenient = EvaluationConfig {
            replace_best_on_tie: true,
            ..EvaluationConfig::default()
        };
        assert!(lenient.improves_on(0.6, 0.6));
    }

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!("multi-expert".parse::<StrategyKind>(), Ok(StrategyKind::MultiExpert));
        assert_eq!(" LLM_GRADED ".parse::<StrategyKind>(), Ok(StrategyKind::LlmGraded));
        assert!("random".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::default(), StrategyKind::RuleBased);
        assert!(!StrategyKind::RuleBased.uses_llm());
    }

    #[test]
    fn test_partial_toml_style_deserialize_uses_defaults() {
        let cfg: EvaluationConfig =
            serde_json::from_str(r#"{"quality_threshold": 0.9}"#).unwrap();
        assert_eq!(cfg.quality_threshold, 0.9);
        assert_eq!(cfg.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(cfg.dimension_weights.len(), 6);
    }
}
