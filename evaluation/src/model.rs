//! Evaluation data model — dimensions, results, and task context.
//!
//! Every strategy produces an [`EvaluationResult`]. Results are built through
//! constructors that take the quality threshold, so `needs_revision` always
//! agrees with `overall_score < threshold`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata key set on results produced by a fallback path.
pub const META_DEGRADED: &str = "degraded";
/// Metadata key carrying the reason a result was degraded.
pub const META_DEGRADED_REASON: &str = "degraded_reason";
/// Metadata key carrying an explicit error tag.
pub const META_ERROR: &str = "error";

/// Suggestion attached to the short-circuit result for empty content.
pub const EMPTY_CONTENT_SUGGESTION: &str = "content is empty";

/// One of the six quality axes scored per evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Relevance,
    Completeness,
    Accuracy,
    Clarity,
    Coherence,
    ScientificRigor,
}

impl Dimension {
    /// All dimensions in canonical order.
    pub const ALL: [Dimension; 6] = [
        Self::Relevance,
        Self::Completeness,
        Self::Accuracy,
        Self::Clarity,
        Self::Coherence,
        Self::ScientificRigor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Completeness => "completeness",
            Self::Accuracy => "accuracy",
            Self::Clarity => "clarity",
            Self::Coherence => "coherence",
            Self::ScientificRigor => "scientific_rigor",
        }
    }

    /// Parse a dimension from its snake_case name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp a score into `[0, 1]`, mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Six named scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationDimensions {
    pub relevance: f64,
    pub completeness: f64,
    pub accuracy: f64,
    pub clarity: f64,
    pub coherence: f64,
    pub scientific_rigor: f64,
}

impl EvaluationDimensions {
    /// Build from raw values, clamping each into `[0, 1]`.
    pub fn new(
        relevance: f64,
        completeness: f64,
        accuracy: f64,
        clarity: f64,
        coherence: f64,
        scientific_rigor: f64,
    ) -> Self {
        Self {
            relevance: clamp_unit(relevance),
            completeness: clamp_unit(completeness),
            accuracy: clamp_unit(accuracy),
            clarity: clamp_unit(clarity),
            coherence: clamp_unit(coherence),
            scientific_rigor: clamp_unit(scientific_rigor),
        }
    }

    /// Every dimension set to the same value.
    pub fn uniform(value: f64) -> Self {
        Self::new(value, value, value, value, value, value)
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Relevance => self.relevance,
            Dimension::Completeness => self.completeness,
            Dimension::Accuracy => self.accuracy,
            Dimension::Clarity => self.clarity,
            Dimension::Coherence => self.coherence,
            Dimension::ScientificRigor => self.scientific_rigor,
        }
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        let value = clamp_unit(value);
        match dimension {
            Dimension::Relevance => self.relevance = value,
            Dimension::Completeness => self.completeness = value,
            Dimension::Accuracy => self.accuracy = value,
            Dimension::Clarity => self.clarity = value,
            Dimension::Coherence => self.coherence = value,
            Dimension::ScientificRigor => self.scientific_rigor = value,
        }
    }

    /// `(dimension, score)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        Dimension::ALL.into_iter().map(|d| (d, self.get(d)))
    }

    /// Lowest score across all six dimensions.
    pub fn min(&self) -> f64 {
        self.iter().map(|(_, v)| v).fold(1.0, f64::min)
    }

    /// Dimensions sorted ascending by score; ties keep canonical order.
    pub fn ascending(&self) -> Vec<(Dimension, f64)> {
        let mut pairs: Vec<(Dimension, f64)> = self.iter().collect();
        pairs.sort_by(|a, b| a.1.total_cmp(&b.1));
        pairs
    }

    /// Dimensions scoring strictly below `cutoff`, in canonical order.
    pub fn below(&self, cutoff: f64) -> Vec<(Dimension, f64)> {
        self.iter().filter(|(_, v)| *v < cutoff).collect()
    }

    /// Name → score map, the shape persisted alongside each iteration.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.iter().map(|(d, v)| (d.as_str().to_string(), v)).collect()
    }
}

/// Identity of the task being evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskContext {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: String,
}

impl TaskContext {
    pub fn new(id: impl Into<String>, name: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            task_type: task_type.into(),
        }
    }
}

/// Scored output of any evaluation strategy.
///
/// Created once per iteration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub overall_score: f64,
    pub dimensions: EvaluationDimensions,
    pub suggestions: Vec<String>,
    pub needs_revision: bool,
    pub iteration: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Rewritten content proposed by the strategy itself (adversarial arena).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_content: Option<String>,
}

impl EvaluationResult {
    /// Build a result; `needs_revision` is derived from `threshold`.
    pub fn scored(
        overall_score: f64,
        dimensions: EvaluationDimensions,
        iteration: u32,
        threshold: f64,
    ) -> Self {
        let overall_score = clamp_unit(overall_score);
        Self {
            overall_score,
            dimensions,
            suggestions: Vec::new(),
            needs_revision: overall_score < threshold,
            iteration,
            metadata: BTreeMap::new(),
            refined_content: None,
        }
    }

    /// All-zero result.
    pub fn zero(iteration: u32, threshold: f64) -> Self {
        Self::scored(0.0, EvaluationDimensions::default(), iteration, threshold)
    }

    /// Short-circuit result for empty content; no external call is made.
    pub fn empty_content(iteration: u32, threshold: f64) -> Self {
        Self::zero(iteration, threshold)
            .with_suggestions(vec![EMPTY_CONTENT_SUGGESTION.to_string()])
            .with_metadata(META_ERROR, "empty_content")
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_refined_content(mut self, content: impl Into<String>) -> Self {
        self.refined_content = Some(content.into());
        self
    }

    /// Flag this result as produced by deterministic fallback logic.
    pub fn mark_degraded(self, reason: &str) -> Self {
        self.with_metadata(META_DEGRADED, true)
            .with_metadata(META_DEGRADED_REASON, reason)
    }

    pub fn is_degraded(&self) -> bool {
        self.metadata
            .get(META_DEGRADED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        self.metadata.get(META_DEGRADED_REASON).and_then(Value::as_str)
    }

    pub fn error_tag(&self) -> Option<&str> {
        self.metadata.get(META_ERROR).and_then(Value::as_str)
    }

    /// The `n` weakest dimensions, lowest first.
    pub fn lowest_dimensions(&self, n: usize) -> Vec<(Dimension, f64)> {
        self.dimensions.ascending().into_iter().take(n).collect()
    }
}

/// Union string lists with de-duplication, preserving first-seen order.
pub fn union_dedup<'a, I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for list in lists {
        for item in list {
            let key = item.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            if seen.insert(key) {
                out.push(item.trim().to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_revision_tracks_threshold() {
        let dims = EvaluationDimensions::uniform(0.5);
        let below = EvaluationResult::scored(0.79, dims, 0, 0.8);
        let at = EvaluationResult::scored(0.8, dims, 0, 0.8);
        assert!(below.needs_revision);
        assert!(!at.needs_revision);
    }

    #[test]
    fn test_scores_are_clamped() {
        let dims = EvaluationDimensions::new(1.4, -0.2, f64::NAN, 0.5, 0.5, 0.5);
        assert_eq!(dims.relevance, 1.0);
        assert_eq!(dims.completeness, 0.0);
        assert_eq!(dims.accuracy, 0.0);

        let result = EvaluationResult::scored(3.0, dims, 1, 0.8);
        assert_eq!(result.overall_score, 1.0);
    }

    #[test]
    fn test_empty_content_result() {
        let result = EvaluationResult::empty_content(2, 0.8);
        assert_eq!(result.overall_score, 0.0);
        assert!(result.needs_revision);
        assert_eq!(result.suggestions, vec!["content is empty".to_string()]);
        assert_eq!(result.iteration, 2);
        assert!(!result.is_degraded());
    }

    #[test]
    fn test_degraded_flag_round_trips_through_metadata() {
        let result = EvaluationResult::zero(0, 0.8).mark_degraded("parse_failure");
        assert!(result.is_degraded());
        assert_eq!(result.degraded_reason(), Some("parse_failure"));

        let json = serde_json::to_string(&result).unwrap();
        let parsed: EvaluationResult = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_degraded());
    }

    #[test]
    fn test_lowest_dimensions_order() {
        let dims = EvaluationDimensions::new(0.9, 0.3, 0.8, 0.3, 0.7, 0.1);
        let result = EvaluationResult::scored(0.5, dims, 0, 0.8);
        let lowest = result.lowest_dimensions(3);
        assert_eq!(lowest[0].0, Dimension::ScientificRigor);
        assert_eq!(lowest[1].0, Dimension::Completeness);
        assert_eq!(lowest[2].0, Dimension::Clarity);
    }

    #[test]
    fn test_dimension_parse_and_display() {
        assert_eq!(Dimension::parse("scientific_rigor"), Some(Dimension::ScientificRigor));
        assert_eq!(Dimension::parse(" Clarity "), Some(Dimension::Clarity));
        assert_eq!(Dimension::parse("style"), None);
        assert_eq!(Dimension::Coherence.to_string(), "coherence");
    }

    #[test]
    fn test_union_dedup_preserves_first_seen() {
        let a = vec!["Add citations".to_string(), "Shorten intro".to_string()];
        let b = vec!["add citations".to_string(), "Define terms".to_string()];
        let merged = union_dedup([a.as_slice(), b.as_slice()]);
        assert_eq!(merged, vec!["Add citations", "Shorten intro", "Define terms"]);
    }

    #[test]
    fn test_task_context_serializes_type_field() {
        let ctx = TaskContext::new("t-1", "Protein folding summary", "report");
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["type"], "report");
    }
}
