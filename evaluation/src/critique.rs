//! Critic feedback: criticisms, severity weighting, robustness.
//!
//! A critic (LLM or heuristic) attacks a piece of content with a list of
//! [`Criticism`]s. Robustness is what remains after subtracting each
//! criticism's severity weight from a perfect score.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{clamp_unit, Dimension, EvaluationDimensions};
use crate::text;

/// Word count below which content is criticised as incomplete.
pub const MIN_WORDS: usize = 100;
/// Word count above which content is criticised as overlong.
pub const MAX_WORDS: usize = 500;

/// Severity of a criticism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "critical", alias = "HIGH", alias = "High")]
    High,
    #[serde(alias = "moderate", alias = "MEDIUM", alias = "Medium")]
    Medium,
    #[serde(alias = "minor", alias = "LOW", alias = "Low")]
    Low,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Robustness penalty per severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            high: 0.3,
            medium: 0.1,
            low: 0.05,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, w) in [("high", self.high), ("medium", self.medium), ("low", self.low)] {
            if !w.is_finite() || w < 0.0 {
                return Err(format!("severity weight '{name}' must be non-negative, got {w}"));
            }
        }
        Ok(())
    }
}

/// A single critic finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criticism {
    pub category: String,
    pub issue: String,
    pub severity: Severity,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub evidence: String,
}

impl Criticism {
    pub fn new(category: &str, issue: &str, severity: Severity) -> Self {
        Self {
            category: category.to_string(),
            issue: issue.to_string(),
            severity,
            suggestion: String::new(),
            evidence: String::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.suggestion = suggestion.to_string();
        self
    }

    pub fn with_evidence(mut self, evidence: &str) -> Self {
        self.evidence = evidence.to_string();
        self
    }

    /// Dimension this criticism counts against, if its category names one.
    pub fn dimension(&self) -> Option<Dimension> {
        category_dimension(&self.category)
    }

    /// Suggestion text, falling back to the issue itself.
    pub fn actionable_text(&self) -> &str {
        if self.suggestion.trim().is_empty() {
            &self.issue
        } else {
            &self.suggestion
        }
    }
}

/// Map a free-form critic category onto a quality dimension.
pub fn category_dimension(category: &str) -> Option<Dimension> {
    let c = category.trim().to_lowercase();
    if let Some(d) = Dimension::parse(&c) {
        return Some(d);
    }
    let has = |needles: &[&str]| needles.iter().any(|n| c.contains(n));
    if has(&["relevan", "topic", "scope"]) {
        Some(Dimension::Relevance)
    } else if has(&["complete", "length", "coverage", "missing", "depth"]) {
        Some(Dimension::Completeness)
    } else if has(&["accura", "fact", "correct", "error", "claim"]) {
        Some(Dimension::Accuracy)
    } else if has(&["clar", "structure", "readab", "style", "format"]) {
        Some(Dimension::Clarity)
    } else if has(&["coheren", "logic", "flow", "consisten", "transition"]) {
        Some(Dimension::Coherence)
    } else if has(&["rigor", "rigour", "method", "scien", "statist", "evidence", "citation"]) {
        Some(Dimension::ScientificRigor)
    } else {
        None
    }
}

/// `max(0, 1 − Σ severity_weight)`; no criticisms ⇒ 1.0.
pub fn robustness_score(criticisms: &[Criticism], weights: &SeverityWeights) -> f64 {
    let penalty: f64 = criticisms.iter().map(|c| weights.weight(c.severity)).sum();
    clamp_unit(1.0 - penalty)
}

/// Per-dimension robustness: each dimension only pays for criticisms mapped onto it.
pub fn dimension_robustness(
    criticisms: &[Criticism],
    weights: &SeverityWeights,
) -> EvaluationDimensions {
    let mut penalties: BTreeMap<Dimension, f64> = BTreeMap::new();
    for c in criticisms {
        if let Some(d) = c.dimension() {
            *penalties.entry(d).or_default() += weights.weight(c.severity);
        }
    }
    let mut dims = EvaluationDimensions::uniform(1.0);
    for (d, penalty) in penalties {
        dims.set(d, 1.0 - penalty);
    }
    dims
}

/// Deterministic criticisms used when the critic's output is unusable.
pub fn heuristic_criticisms(content: &str) -> Vec<Criticism> {
    let mut out = Vec::new();
    let words = text::word_count(content);
    if words < MIN_WORDS {
        out.push(
            Criticism::new(
                "completeness",
                &format!("content is too short ({words} words)"),
                Severity::High,
            )
            .with_suggestion("expand the content with more detail and supporting explanation"),
        );
    }
    if words > MAX_WORDS {
        out.push(
            Criticism::new(
                "length",
                &format!("content is too long ({words} words)"),
                Severity::Low,
            )
            .with_suggestion("tighten the content and remove redundant passages"),
        );
    }
    if !text::has_paragraph_breaks(content) {
        out.push(
            Criticism::new("structure", "content has no paragraph breaks", Severity::Medium)
                .with_suggestion("split the content into paragraphs separated by blank lines"),
        );
    }
    out
}

/// Categories ordered by frequency (descending), ties alphabetical.
pub fn top_categories<'a, I>(criticisms: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a Criticism>,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for c in criticisms {
        *counts.entry(c.category.trim().to_lowercase()).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(c, _)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_robustness_no_criticisms_is_perfect() {
        assert_eq!(robustness_score(&[], &SeverityWeights::default()), 1.0);
    }

    #[test]
    fn test_robustness_subtracts_severity_weights() {
        let crits = vec![
            Criticism::new("accuracy", "unsupported claim", Severity::High),
            Criticism::new("clarity", "dense prose", Severity::Medium),
            Criticism::new("style", "passive voice", Severity::Low),
        ];
        let score = robustness_score(&crits, &SeverityWeights::default());
        assert!((score - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_robustness_floors_at_zero() {
        let crits: Vec<_> = (0..5)
            .map(|i| Criticism::new("accuracy", &format!("issue {i}"), Severity::High))
            .collect();
        assert_eq!(robustness_score(&crits, &SeverityWeights::default()), 0.0);
    }

    #[test]
    fn test_heuristic_short_flat_content() {
        let crits = heuristic_criticisms("Only a few words here.");
        assert_eq!(crits.len(), 2);
        assert_eq!(crits[0].severity, Severity::High);
        assert_eq!(crits[0].category, "completeness");
        assert_eq!(crits[1].severity, Severity::Medium);
        assert_eq!(crits[1].category, "structure");
    }

    #[test]
    fn test_heuristic_long_content() {
        let para = "word ".repeat(300);
        let content = format!("{para}\n\n{para}");
        let crits = heuristic_criticisms(&content);
        assert_eq!(crits.len(), 1);
        assert_eq!(crits[0].severity, Severity::Low);
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(category_dimension("Scientific_Rigor"), Some(Dimension::ScientificRigor));
        assert_eq!(category_dimension("structure"), Some(Dimension::Clarity));
        assert_eq!(category_dimension("logical flow"), Some(Dimension::Coherence));
        assert_eq!(category_dimension("length"), Some(Dimension::Completeness));
        assert_eq!(category_dimension("vibes"), None);
    }

    #[test]
    fn test_dimension_robustness_only_penalizes_mapped_dimension() {
        let crits = vec![
            Criticism::new("accuracy", "a", Severity::High),
            Criticism::new("accuracy", "b", Severity::Medium),
        ];
        let dims = dimension_robustness(&crits, &SeverityWeights::default());
        assert!((dims.accuracy - 0.6).abs() < 1e-9);
        assert_eq!(dims.relevance, 1.0);
    }

    #[test]
    fn test_severity_aliases_deserialize() {
        let c: Criticism = serde_json::from_str(
            r#"{"category":"accuracy","issue":"x","severity":"critical"}"#,
        )
        .unwrap();
        assert_eq!(c.severity, Severity::High);
        assert!(c.suggestion.is_empty());
        assert_eq!(c.actionable_text(), "x");
    }

    #[test]
    fn test_top_categories_by_frequency() {
        let crits = vec![
            Criticism::new("clarity", "a", Severity::Low),
            Criticism::new("accuracy", "b", Severity::Low),
            Criticism::new("Clarity", "c", Severity::Low),
        ];
        assert_eq!(top_categories(&crits, 2), vec!["clarity", "accuracy"]);
    }
}
