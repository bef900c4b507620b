//! LLM-graded strategy — the model scores all six dimensions in one call.
//!
//! ## Degradation
//!
//! | Failure                          | Result                                   |
//! |----------------------------------|------------------------------------------|
//! | transport / timeout / cancel     | rule-based scores, `transport_failure`   |
//! | no JSON object / wrong types     | rule-based scores, `parse_failure`       |
//! | any dimension missing            | rule-based scores, `missing_fields`      |
//! | suggestion call fails            | templated suggestion per weak dimension  |

use evaluation::resilience::{DegradedReason, DegradedResponse};
use evaluation::rules::suggestions_for;
use evaluation::{
    Dimension, EvaluationConfig, EvaluationDimensions, EvaluationResult, ExpertProfile,
    RuleBasedScorer, TaskContext,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::llm::{extract_json_array, extract_json_object, schema_json, LlmCaller};

const GRADER_PREAMBLE: &str = "You are a meticulous reviewer of written scientific and \
    technical work. You score strictly against the rubric and respond with JSON only.";

const SUGGESTION_PREAMBLE: &str = "You are an editor giving concrete, actionable revision \
    advice. Respond with a JSON array of strings only.";

/// Expected grading response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GradeResponse {
    /// How directly the content addresses the task (0.0-1.0).
    pub relevance: f64,
    /// Coverage of the topic, with introduction, body and conclusion (0.0-1.0).
    pub completeness: f64,
    /// Factual correctness and absence of contradictions (0.0-1.0).
    pub accuracy: f64,
    /// Readability: sentence length, paragraphing, transitions (0.0-1.0).
    pub clarity: f64,
    /// Logical flow between paragraphs (0.0-1.0).
    pub coherence: f64,
    /// Methodological soundness and quantitative support (0.0-1.0).
    pub scientific_rigor: f64,
    /// Short justification of the scores.
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
}

impl GradeResponse {
    /// Dimensions, rescaling 0-10 answers into the unit interval.
    ///
    /// A response counts as ten-point only when every value lies in [0, 10]
    /// and at least one reaches 2; a stray 1.05 on a unit-scale answer is
    /// clamped instead.
    pub fn dimensions(&self) -> EvaluationDimensions {
        let raw = [
            self.relevance,
            self.completeness,
            self.accuracy,
            self.clarity,
            self.coherence,
            self.scientific_rigor,
        ];
        let ten_point = raw.iter().all(|v| (0.0..=10.0).contains(v)) && raw.iter().any(|v| *v >= 2.0);
        let scale = if ten_point { 10.0 } else { 1.0 };
        EvaluationDimensions::new(
            raw[0] / scale,
            raw[1] / scale,
            raw[2] / scale,
            raw[3] / scale,
            raw[4] / scale,
            raw[5] / scale,
        )
    }
}

/// Parse and validate a grading response.
pub fn parse_grade(raw: &str) -> Result<GradeResponse, DegradedReason> {
    let json = extract_json_object(raw).ok_or(DegradedReason::ParseFailure)?;
    let value: Value = serde_json::from_str(json).map_err(|_| DegradedReason::ParseFailure)?;
    let object = value.as_object().ok_or(DegradedReason::ParseFailure)?;
    let complete = Dimension::ALL
        .iter()
        .all(|d| object.get(d.as_str()).is_some_and(Value::is_number));
    if !complete {
        return Err(DegradedReason::MissingFields);
    }
    serde_json::from_value(value).map_err(|_| DegradedReason::ParseFailure)
}

/// A graded evaluation plus the model's qualitative notes.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedEvaluation {
    pub result: EvaluationResult,
    pub strengths: Vec<String>,
    pub concerns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LlmGradedStrategy {
    caller: LlmCaller,
    config: EvaluationConfig,
    fallback: RuleBasedScorer,
    preamble: String,
    expert: Option<String>,
}

impl LlmGradedStrategy {
    pub fn new(caller: LlmCaller, config: EvaluationConfig) -> Self {
        Self {
            caller,
            fallback: RuleBasedScorer::new(config.clone()),
            config,
            preamble: GRADER_PREAMBLE.to_string(),
            expert: None,
        }
    }

    /// Grade as a specific expert persona.
    pub fn with_persona(mut self, profile: &ExpertProfile) -> Self {
        self.preamble = format!("{}\n{}", profile.system_prompt(), GRADER_PREAMBLE);
        self.expert = Some(profile.name.clone());
        self
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub async fn evaluate(
        &self,
        content: &str,
        task: &TaskContext,
        iteration: u32,
        cancel: &CancellationToken,
    ) -> EvaluationResult {
        self.grade(content, task, iteration, cancel)
            .await
            .map(|graded| graded.result)
            .into_result()
    }

    /// Grade `content`, reporting whether the model or the fallback served it.
    pub async fn grade(
        &self,
        content: &str,
        task: &TaskContext,
        iteration: u32,
        cancel: &CancellationToken,
    ) -> DegradedResponse<GradedEvaluation> {
        let threshold = self.config.quality_threshold;
        if content.trim().is_empty() {
            return DegradedResponse::full(
                GradedEvaluation {
                    result: EvaluationResult::empty_content(iteration, threshold),
                    strengths: Vec::new(),
                    concerns: Vec::new(),
                },
                "short_circuit",
            );
        }

        let prompt = grading_prompt(content, task);
        let raw = match self.caller.call(Some(&self.preamble), &prompt, cancel).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(task_id = %task.id, expert = ?self.expert, error = %e, "Grading call failed; using rule-based fallback");
                return self.fallback(content, task, iteration, DegradedReason::TransportFailure, &e.to_string());
            }
        };

        let grade = match parse_grade(&raw) {
            Ok(grade) => grade,
            Err(reason) => {
                warn!(task_id = %task.id, expert = ?self.expert, %reason, "Grading response rejected; using rule-based fallback");
                return self.fallback(content, task, iteration, reason, "grading response unusable");
            }
        };

        let dimensions = grade.dimensions();
        let overall = self.config.overall_score(&dimensions);
        let suggestions = self.suggest(content, task, &dimensions, cancel).await;

        let mut result = EvaluationResult::scored(overall, dimensions, iteration, threshold)
            .with_suggestions(suggestions)
            .with_metadata("strategy", "llm_graded")
            .with_metadata("strengths", serde_json::json!(grade.strengths))
            .with_metadata("concerns", serde_json::json!(grade.concerns));
        if !grade.explanation.trim().is_empty() {
            result = result.with_metadata("explanation", grade.explanation.trim());
        }
        if let Some(expert) = &self.expert {
            result = result.with_metadata("expert", expert.as_str());
        }
        debug!(task_id = %task.id, expert = ?self.expert, overall, "Content graded");

        DegradedResponse::full(
            GradedEvaluation {
                result,
                strengths: grade.strengths,
                concerns: grade.concerns,
            },
            "llm",
        )
    }

    fn fallback(
        &self,
        content: &str,
        task: &TaskContext,
        iteration: u32,
        reason: DegradedReason,
        warning: &str,
    ) -> DegradedResponse<GradedEvaluation> {
        let mut result = self
            .fallback
            .evaluate(content, task, iteration)
            .with_metadata("strategy", "llm_graded")
            .with_metadata("served_by", "rule_based");
        if let Some(expert) = &self.expert {
            result = result.with_metadata("expert", expert.as_str());
        }
        DegradedResponse::partial(
            GradedEvaluation {
                result,
                strengths: Vec::new(),
                concerns: Vec::new(),
            },
            "rule_based",
            0.5,
            reason,
            warning,
        )
    }

    /// Second call for advice on weak dimensions only; none weak ⇒ no call.
    async fn suggest(
        &self,
        content: &str,
        task: &TaskContext,
        dimensions: &EvaluationDimensions,
        cancel: &CancellationToken,
    ) -> Vec<String> {
        let cutoff = self.config.suggestion_cutoff;
        let mut weak = dimensions.below(cutoff);
        if weak.is_empty() {
            return Vec::new();
        }
        weak.sort_by(|a, b| a.1.total_cmp(&b.1));

        let listing: Vec<String> = weak
            .iter()
            .map(|(d, score)| format!("- {d}: {score:.2}"))
            .collect();
        let prompt = format!(
            "The content below, written for the task \"{}\", scored poorly on these dimensions:\n{}\n\n\
             Give one specific, actionable suggestion per dimension, naming the dimension in each. \
             Respond with ONLY a JSON array of strings.\n\nContent:\n---\n{}\n---",
            task.name,
            listing.join("\n"),
            content.trim()
        );

        match self.caller.call(Some(SUGGESTION_PREAMBLE), &prompt, cancel).await {
            Ok(raw) => {
                let parsed: Option<Vec<String>> =
                    extract_json_array(&raw).and_then(|json| serde_json::from_str(json).ok());
                match parsed {
                    Some(list) if list.iter().any(|s| !s.trim().is_empty()) => list
                        .into_iter()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                    _ => {
                        warn!(task_id = %task.id, "Suggestion response unusable; using templated suggestions");
                        suggestions_for(dimensions, cutoff)
                    }
                }
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Suggestion call failed; using templated suggestions");
                suggestions_for(dimensions, cutoff)
            }
        }
    }
}

fn grading_prompt(content: &str, task: &TaskContext) -> String {
    format!(
        "Evaluate the content below, written for the task \"{name}\" (type: {kind}).\n\
         Score each dimension from 0.0 (absent) to 1.0 (excellent):\n\
         - relevance: addresses the task directly\n\
         - completeness: covers the topic with introduction, body and conclusion\n\
         - accuracy: correct, consistent, specific claims\n\
         - clarity: readable sentences, paragraphing and transitions\n\
         - coherence: paragraphs build on each other logically\n\
         - scientific_rigor: sound methods and quantitative support\n\n\
         Respond with ONLY a JSON object matching this schema:\n{schema}\n\n\
         Content:\n---\n{content}\n---",
        name = task.name,
        kind = task.task_type,
        schema = schema_json::<GradeResponse>(),
        content = content.trim(),
    )
}
