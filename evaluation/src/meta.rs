//! Meta-evaluation statistics — consistency, cognitive bias, and health.
//!
//! Audits a run's evaluation history rather than the content itself. All of
//! this is deterministic; the only external input is an optional
//! [`LlmMetaAssessment`], which callers substitute with
//! [`LlmMetaAssessment::fallback`] when the model is unavailable.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{clamp_unit, Dimension, EvaluationResult};
use crate::stats;

/// Minimum history length for trend analysis and most bias checks.
pub const MIN_TREND_SAMPLES: usize = 3;
/// History length below which a volume recommendation is emitted.
pub const MIN_RELIABLE_SAMPLES: usize = 5;
/// Indicators below this value produce a recommendation.
pub const RECOMMENDATION_CUTOFF: f64 = 0.6;

const TREND_DELTA: f64 = 0.1;
const ANCHORING_MEAN_DEVIATION: f64 = 0.1;
const CONFIRMATION_BAND: f64 = 0.05;
const HALO_CORRELATION: f64 = 0.9;
const RECENCY_SHIFT: f64 = 0.3;
const SEVERITY_MEAN: f64 = 0.3;
const LENIENCY_MEAN: f64 = 0.9;

/// Direction of scores over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Improving => write!(f, "improving"),
            Self::Declining => write!(f, "declining"),
            Self::Stable => write!(f, "stable"),
            Self::InsufficientData => write!(f, "insufficient_data"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    VeryStable,
    Stable,
    ModeratelyStable,
    Unstable,
}

impl Stability {
    /// Bucket a standard deviation.
    pub fn from_variance(variance: f64) -> Self {
        if variance < 0.05 {
            Self::VeryStable
        } else if variance < 0.1 {
            Self::Stable
        } else if variance < 0.2 {
            Self::ModeratelyStable
        } else {
            Self::Unstable
        }
    }
}

impl std::fmt::Display for Stability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VeryStable => write!(f, "very_stable"),
            Self::Stable => write!(f, "stable"),
            Self::ModeratelyStable => write!(f, "moderately_stable"),
            Self::Unstable => write!(f, "unstable"),
        }
    }
}

/// Cognitive biases detectable from a score history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasKind {
    /// Later scores stick to the first one.
    Anchoring,
    /// All scores stay within a narrow band of the first.
    Confirmation,
    /// Dimensions move together regardless of content.
    Halo,
    /// Late scores diverge sharply from early ones.
    Recency,
    /// Consistently harsh scoring.
    Severity,
    /// Consistently generous scoring.
    Leniency,
}

impl std::fmt::Display for BiasKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anchoring => write!(f, "anchoring"),
            Self::Confirmation => write!(f, "confirmation"),
            Self::Halo => write!(f, "halo"),
            Self::Recency => write!(f, "recency"),
            Self::Severity => write!(f, "severity"),
            Self::Leniency => write!(f, "leniency"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Excellent
        } else if score >= 0.7 {
            Self::Good
        } else if score >= 0.6 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "excellent"),
            Self::Good => write!(f, "good"),
            Self::Fair => write!(f, "fair"),
            Self::Poor => write!(f, "poor"),
        }
    }
}

/// Score spread and direction over a history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyAnalysis {
    pub consistency_score: f64,
    /// Sample standard deviation of overall scores.
    pub variance: f64,
    pub trend: Trend,
    pub stability: Stability,
}

pub fn analyze_consistency(scores: &[f64]) -> ConsistencyAnalysis {
    let variance = stats::sample_stdev(scores);
    let consistency_score = if scores.is_empty() {
        0.0
    } else {
        (1.0 - 2.0 * variance).max(0.0)
    };
    ConsistencyAnalysis {
        consistency_score,
        variance,
        trend: score_trend(scores),
        stability: Stability::from_variance(variance),
    }
}

/// Mean of the second half minus mean of the first half (split at `n/2`).
pub fn score_trend(scores: &[f64]) -> Trend {
    if scores.len() < MIN_TREND_SAMPLES {
        return Trend::InsufficientData;
    }
    let (first, second) = scores.split_at(scores.len() / 2);
    let delta = stats::mean(second) - stats::mean(first);
    if delta > TREND_DELTA {
        Trend::Improving
    } else if delta < -TREND_DELTA {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Biases found in a history; each triggered bias carries a score in `[0.5, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasAnalysis {
    pub biases_detected: BTreeSet<BiasKind>,
    pub bias_scores: BTreeMap<BiasKind, f64>,
    pub overall_bias_risk: f64,
}

impl BiasAnalysis {
    fn record(&mut self, kind: BiasKind, strength: f64) {
        self.biases_detected.insert(kind);
        self.bias_scores.insert(kind, 0.5 + 0.5 * clamp_unit(strength));
    }

    pub fn has(&self, kind: BiasKind) -> bool {
        self.biases_detected.contains(&kind)
    }
}

pub fn detect_biases(history: &[EvaluationResult]) -> BiasAnalysis {
    let scores: Vec<f64> = history.iter().map(|r| r.overall_score).collect();
    let n = scores.len();
    let mut analysis = BiasAnalysis::default();
    let Some(&first) = scores.first() else {
        return analysis;
    };

    if n >= MIN_TREND_SAMPLES {
        let deviations: Vec<f64> = scores[1..].iter().map(|s| (s - first).abs()).collect();

        let mean_deviation = stats::mean(&deviations);
        if mean_deviation < ANCHORING_MEAN_DEVIATION {
            analysis.record(
                BiasKind::Anchoring,
                (ANCHORING_MEAN_DEVIATION - mean_deviation) / ANCHORING_MEAN_DEVIATION,
            );
        }

        let max_deviation = deviations.iter().copied().fold(0.0, f64::max);
        if max_deviation <= CONFIRMATION_BAND {
            analysis.record(
                BiasKind::Confirmation,
                (CONFIRMATION_BAND - max_deviation) / CONFIRMATION_BAND,
            );
        }

        if let Some(correlation) = halo_correlation(history) {
            if correlation > HALO_CORRELATION {
                analysis.record(
                    BiasKind::Halo,
                    (correlation - HALO_CORRELATION) / (1.0 - HALO_CORRELATION),
                );
            }
        }
    }

    if n >= 4 {
        let shift = (stats::mean(&scores[n - 2..]) - stats::mean(&scores[..2])).abs();
        if shift > RECENCY_SHIFT {
            analysis.record(BiasKind::Recency, (shift - RECENCY_SHIFT) / (1.0 - RECENCY_SHIFT));
        }
    }

    let mean = stats::mean(&scores);
    if mean < SEVERITY_MEAN {
        analysis.record(BiasKind::Severity, (SEVERITY_MEAN - mean) / SEVERITY_MEAN);
    }
    if mean > LENIENCY_MEAN {
        analysis.record(BiasKind::Leniency, (mean - LENIENCY_MEAN) / (1.0 - LENIENCY_MEAN));
    }

    let triggered: Vec<f64> = analysis.bias_scores.values().copied().collect();
    analysis.overall_bias_risk = stats::mean(&triggered);
    analysis
}

/// Mean pairwise Pearson correlation across non-constant dimension series.
///
/// `None` when fewer than two dimensions vary over the history.
pub fn halo_correlation(history: &[EvaluationResult]) -> Option<f64> {
    let series: Vec<Vec<f64>> = Dimension::ALL
        .into_iter()
        .map(|d| history.iter().map(|r| r.dimensions.get(d)).collect::<Vec<_>>())
        .filter(|s| !stats::is_constant(s))
        .collect();
    if series.len() < 2 {
        return None;
    }
    let mut correlations = Vec::new();
    for i in 0..series.len() {
        for j in (i + 1)..series.len() {
            if let Some(r) = stats::pearson(&series[i], &series[j]) {
                correlations.push(r);
            }
        }
    }
    if correlations.is_empty() {
        None
    } else {
        Some(stats::mean(&correlations))
    }
}

/// Optional model self-critique of an evaluation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMetaAssessment {
    pub meta_score: f64,
    pub confidence: f64,
    #[serde(default)]
    pub observations: Vec<String>,
}

impl LlmMetaAssessment {
    pub const FALLBACK_SCORE: f64 = 0.6;
    pub const FALLBACK_CONFIDENCE: f64 = 0.3;

    pub fn new(meta_score: f64, confidence: f64, observations: Vec<String>) -> Self {
        Self {
            meta_score: clamp_unit(meta_score),
            confidence: clamp_unit(confidence),
            observations,
        }
    }

    /// Neutral stand-in when no model judgment is available.
    pub fn fallback() -> Self {
        Self::new(Self::FALLBACK_SCORE, Self::FALLBACK_CONFIDENCE, Vec::new())
    }
}

impl Default for LlmMetaAssessment {
    fn default() -> Self {
        Self::fallback()
    }
}

/// Full audit of one evaluation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaReport {
    pub consistency_score: f64,
    pub variance: f64,
    pub trend: Trend,
    pub stability: Stability,
    pub biases_detected: BTreeSet<BiasKind>,
    pub bias_scores: BTreeMap<BiasKind, f64>,
    pub overall_bias_risk: f64,
    pub meta_score: f64,
    pub meta_confidence: f64,
    pub health_score: f64,
    pub health_status: HealthStatus,
    pub indicators: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
    pub evaluation_count: usize,
    pub llm_observations: Vec<String>,
    /// Whether the model component fell back to its neutral default.
    pub llm_meta_degraded: bool,
}

impl MetaReport {
    /// Compact status line.
    pub fn status_line(&self) -> String {
        let biases: Vec<String> = self.biases_detected.iter().map(|b| b.to_string()).collect();
        format!(
            "[{}] health {:.2} | consistency {:.2} | bias risk {:.2} ({}) | trend {} | n={}",
            self.health_status,
            self.health_score,
            self.consistency_score,
            self.overall_bias_risk,
            if biases.is_empty() { "none".to_string() } else { biases.join(",") },
            self.trend,
            self.evaluation_count
        )
    }
}

/// Combine consistency, bias and the model component into a report.
pub fn build_report(
    history: &[EvaluationResult],
    llm: &LlmMetaAssessment,
    llm_meta_degraded: bool,
) -> MetaReport {
    let scores: Vec<f64> = history.iter().map(|r| r.overall_score).collect();
    let consistency = analyze_consistency(&scores);
    let biases = detect_biases(history);

    let bias_resistance = 1.0 - biases.overall_bias_risk;
    let meta_score = clamp_unit(
        0.3 * consistency.consistency_score + 0.3 * bias_resistance + 0.4 * llm.meta_score,
    );
    let meta_confidence = llm.confidence;
    let health_score = stats::mean(&[
        meta_score,
        consistency.consistency_score,
        bias_resistance,
        meta_confidence,
    ]);

    let indicators = BTreeMap::from([
        ("consistency".to_string(), consistency.consistency_score),
        ("bias_resistance".to_string(), bias_resistance),
        ("meta_quality".to_string(), meta_score),
        ("meta_confidence".to_string(), meta_confidence),
    ]);

    MetaReport {
        recommendations: recommendations(&consistency, &biases, meta_score, meta_confidence, history.len()),
        consistency_score: consistency.consistency_score,
        variance: consistency.variance,
        trend: consistency.trend,
        stability: consistency.stability,
        biases_detected: biases.biases_detected,
        bias_scores: biases.bias_scores,
        overall_bias_risk: biases.overall_bias_risk,
        meta_score,
        meta_confidence,
        health_score,
        health_status: HealthStatus::from_score(health_score),
        indicators,
        evaluation_count: history.len(),
        llm_observations: llm.observations.clone(),
        llm_meta_degraded,
    }
}

fn recommendations(
    consistency: &ConsistencyAnalysis,
    biases: &BiasAnalysis,
    meta_score: f64,
    meta_confidence: f64,
    count: usize,
) -> Vec<String> {
    let mut out = Vec::new();
    if consistency.consistency_score < RECOMMENDATION_CUTOFF {
        out.push(format!(
            "Evaluation scores are inconsistent (stdev {:.2}); pin the rubric or lower model temperature",
            consistency.variance
        ));
    }
    if 1.0 - biases.overall_bias_risk < RECOMMENDATION_CUTOFF {
        let kinds: Vec<String> = biases.biases_detected.iter().map(|b| b.to_string()).collect();
        out.push(format!(
            "High cognitive-bias risk ({}); rotate evaluators or re-score with fresh context",
            kinds.join(", ")
        ));
    }
    if meta_score < RECOMMENDATION_CUTOFF {
        out.push(
            "Meta quality is low; review the evaluation strategy before trusting its scores"
                .to_string(),
        );
    }
    if meta_confidence < RECOMMENDATION_CUTOFF {
        out.push(
            "Meta confidence is low; enable the model self-critique or gather more evidence"
                .to_string(),
        );
    }
    if count < MIN_RELIABLE_SAMPLES {
        out.push(format!(
            "Only {count} evaluation(s) available; collect at least {MIN_RELIABLE_SAMPLES} for reliable meta-analysis"
        ));
    }
    out
}
