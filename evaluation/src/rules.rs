//! Deterministic rule-based scorer.
//!
//! Pure function of `(content, task name, config)`. Used directly as the
//! rule-based strategy and as the degraded substitute whenever an LLM
//! judgment cannot be obtained or parsed.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::EvaluationConfig;
use crate::model::{clamp_unit, Dimension, EvaluationDimensions, EvaluationResult, TaskContext};
use crate::text;

static DIGIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d").expect("DIGIT_RE regex should compile"));
static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+(\.\d+)?\s*(%|percent|mg|ml|kg|ms|s|n\s*=)?").expect("QUANTITY_RE regex should compile")
});

const INTRO_MARKERS: &[&str] = &[
    "introduction", "overview", "background", "purpose", "this report", "this paper",
    "this document", "this study", "in this", "we present", "aims to",
];
const CONCLUSION_MARKERS: &[&str] = &[
    "conclusion", "in conclusion", "in summary", "to summarize", "overall", "therefore",
    "finally", "in short", "taken together",
];
const TRANSITION_WORDS: &[&str] = &[
    "however", "therefore", "moreover", "furthermore", "additionally", "consequently",
    "in addition", "for example", "for instance", "in contrast", "similarly", "thus", "finally",
    "first", "second", "next", "meanwhile", "nevertheless",
];
const HEDGE_PHRASES: &[&str] = &[
    "might", "maybe", "perhaps", "possibly", "could be", "it seems", "somewhat", "probably",
    "arguably", "some say", "sort of", "kind of",
];
const CONTRADICTION_PAIRS: &[(&str, &str)] = &[
    ("always", "never"),
    ("increase", "decrease"),
    ("increases", "decreases"),
    ("all", "none"),
    ("true", "false"),
    ("significant", "insignificant"),
    ("safe", "unsafe"),
];
const METHOD_TERMS: &[&str] = &[
    "method", "methods", "methodology", "hypothesis", "experiment", "experimental", "sample",
    "samples", "data", "dataset", "analysis", "statistical", "control", "controlled",
    "significant", "significance", "p-value", "confidence interval", "evidence", "study",
    "measured", "results", "randomized", "cohort", "replicated",
];

/// Optimal mean sentence length for clarity.
const OPTIMAL_SENTENCE_WORDS: f64 = 15.0;
/// Word-count window that earns the relevance length bonus.
const RELEVANCE_BONUS_RANGE: std::ops::RangeInclusive<usize> = 100..=500;

/// Rule-based scorer; all state lives in the config.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedScorer {
    config: EvaluationConfig,
}

impl RuleBasedScorer {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Score `content` for `task`. Empty content short-circuits.
    pub fn evaluate(&self, content: &str, task: &TaskContext, iteration: u32) -> EvaluationResult {
        let threshold = self.config.quality_threshold;
        if content.trim().is_empty() {
            return EvaluationResult::empty_content(iteration, threshold);
        }

        let dimensions = self.score_dimensions(content, &task.name);
        let overall = self.config.overall_score(&dimensions);
        let suggestions = suggestions_for(&dimensions, self.config.suggestion_cutoff);

        EvaluationResult::scored(overall, dimensions, iteration, threshold)
            .with_suggestions(suggestions)
            .with_metadata("strategy", "rule_based")
            .with_metadata("word_count", text::word_count(content) as u64)
    }

    pub fn score_dimensions(&self, content: &str, task_name: &str) -> EvaluationDimensions {
        EvaluationDimensions::new(
            relevance(content, task_name),
            completeness(content),
            accuracy(content),
            clarity(content),
            coherence(content),
            scientific_rigor(content),
        )
    }
}

/// Templated suggestion per weak dimension, weakest first.
pub fn suggestions_for(dimensions: &EvaluationDimensions, cutoff: f64) -> Vec<String> {
    let mut weak = dimensions.below(cutoff);
    weak.sort_by(|a, b| a.1.total_cmp(&b.1));
    weak.into_iter()
        .map(|(d, score)| format!("{} ({:.2}): {}", d, score, dimension_advice(d)))
        .collect()
}

/// Canned advice for a weak dimension.
pub fn dimension_advice(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Relevance => "address the task topic directly and use its key terms",
        Dimension::Completeness => {
            "cover the topic fully with an introduction, a developed body and a conclusion"
        }
        Dimension::Accuracy => {
            "remove contradictory or vague claims and back statements with concrete details"
        }
        Dimension::Clarity => "use shorter sentences, paragraph breaks and transition words",
        Dimension::Coherence => "connect paragraphs so each builds on shared key concepts",
        Dimension::ScientificRigor => {
            "describe methods and support claims with quantitative evidence"
        }
    }
}

fn relevance(content: &str, task_name: &str) -> f64 {
    let task_keywords = text::keywords(task_name);
    let base = if task_keywords.is_empty() {
        0.5
    } else {
        let content_keywords = text::keywords(content);
        let matches = task_keywords
            .iter()
            .filter(|k| content_keywords.contains(*k))
            .count();
        (matches as f64 / task_keywords.len() as f64).min(1.0)
    };
    let bonus = if RELEVANCE_BONUS_RANGE.contains(&text::word_count(content)) {
        0.1
    } else {
        0.0
    };
    clamp_unit(base + bonus)
}

fn completeness(content: &str) -> f64 {
    let words = text::word_count(content) as f64;
    let paragraphs = text::paragraphs(content);
    let n = paragraphs.len();

    let has_intro = n >= 3
        || paragraphs
            .first()
            .is_some_and(|p| text::contains_any(p, INTRO_MARKERS));
    let has_body = n >= 3 || words >= 150.0;
    let has_conclusion = n >= 3
        || (n >= 2
            && paragraphs
                .last()
                .is_some_and(|p| text::contains_any(p, CONCLUSION_MARKERS)));

    let structural = if has_intro { 0.3 } else { 0.0 }
        + if has_body { 0.4 } else { 0.0 }
        + if has_conclusion { 0.3 } else { 0.0 };

    clamp_unit(0.6 * (words / 200.0).min(1.0) + 0.4 * structural)
}

fn accuracy(content: &str) -> f64 {
    let mut score: f64 = 0.8;

    let contradiction = text::sentences(content).iter().any(|sentence| {
        CONTRADICTION_PAIRS
            .iter()
            .any(|&(a, b)| text::contains_any(sentence, &[a]) && text::contains_any(sentence, &[b]))
    });
    if contradiction {
        score -= 0.2;
    }

    if has_concrete_details(content) {
        score += 0.1;
    }

    if text::count_phrases(content, HEDGE_PHRASES) > 3 {
        score -= 0.1;
    }

    clamp_unit(score)
}

/// Numbers, or a capitalized word that does not open its sentence.
fn has_concrete_details(content: &str) -> bool {
    if DIGIT_RE.is_match(content) {
        return true;
    }
    text::sentences(content).iter().any(|sentence| {
        text::words(sentence)
            .iter()
            .skip(1)
            .any(|w| w.chars().next().is_some_and(char::is_uppercase))
    })
}

fn clarity(content: &str) -> f64 {
    let sentences = text::sentences(content);
    if sentences.is_empty() {
        return 0.0;
    }
    let mean_len = sentences
        .iter()
        .map(|s| text::word_count(s) as f64)
        .sum::<f64>()
        / sentences.len() as f64;
    let length_score =
        (1.0 - (mean_len - OPTIMAL_SENTENCE_WORDS).abs() / OPTIMAL_SENTENCE_WORDS).max(0.0);
    let paragraph_score = if text::paragraphs(content).len() >= 2 {
        1.0
    } else {
        0.5
    };
    let transition_score =
        (text::count_phrases(content, TRANSITION_WORDS) as f64 / 3.0).min(1.0);

    clamp_unit(0.6 * length_score + 0.2 * paragraph_score + 0.2 * transition_score)
}

fn coherence(content: &str) -> f64 {
    let paragraphs = text::paragraphs(content);
    if paragraphs.len() < 2 {
        return 0.7;
    }
    let keyword_sets: Vec<_> = paragraphs.iter().map(|p| text::keywords(p)).collect();
    let overlaps: Vec<f64> = keyword_sets
        .windows(2)
        .map(|pair| {
            let smaller = pair[0].len().min(pair[1].len());
            if smaller == 0 {
                0.0
            } else {
                pair[0].intersection(&pair[1]).count() as f64 / smaller as f64
            }
        })
        .collect();
    let mean = overlaps.iter().sum::<f64>() / overlaps.len() as f64;
    clamp_unit(0.3 + 0.7 * mean)
}

fn scientific_rigor(content: &str) -> f64 {
    let lower = content.to_lowercase();
    let distinct_terms = METHOD_TERMS
        .iter()
        .filter(|&&t| text::contains_any(&lower, &[t]))
        .count();
    let has_quantity = QUANTITY_RE.is_match(content);
    clamp_unit(0.2 + 0.1 * distinct_terms as f64 + if has_quantity { 0.2 } else { 0.0 })
}
