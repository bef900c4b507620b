//! Meta-evaluation: audit an evaluation history for consistency and bias.
//!
//! The statistics are deterministic ([`evaluation::meta`]). The optional
//! model component asks the LLM to judge the history itself; when it is
//! disabled, unreachable or unparseable the neutral fallback (0.6 score,
//! 0.3 confidence) is used and the report is flagged.

use evaluation::meta::build_report;
use evaluation::resilience::{DegradedReason, DegradedResponse};
use evaluation::{EvaluationResult, LlmMetaAssessment, MetaReport, TaskContext};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::llm::{extract_json_object, schema_json, LlmCaller};

/// Longest content excerpt shown to the meta-critic.
const MAX_EXCERPT_CHARS: usize = 2_000;

const META_PREAMBLE: &str = "You audit automated evaluations of written work. You judge \
    whether the scores are plausible, consistent and free of obvious bias. \
    You respond with JSON only.";

/// Expected meta-critic response.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct MetaAssessmentResponse {
    /// Quality of the evaluations themselves (0.0-1.0).
    pub meta_score: f64,
    /// Confidence in this judgment (0.0-1.0).
    pub confidence: f64,
    #[serde(default)]
    pub observations: Vec<String>,
}

pub fn parse_meta_assessment(raw: &str) -> Result<LlmMetaAssessment, DegradedReason> {
    let json = extract_json_object(raw).ok_or(DegradedReason::ParseFailure)?;
    let value: Value = serde_json::from_str(json).map_err(|_| DegradedReason::ParseFailure)?;
    let has_number = |key: &str| value.get(key).is_some_and(Value::is_number);
    if !has_number("meta_score") || !has_number("confidence") {
        return Err(DegradedReason::MissingFields);
    }
    let response: MetaAssessmentResponse =
        serde_json::from_value(value).map_err(|_| DegradedReason::ParseFailure)?;
    Ok(LlmMetaAssessment::new(
        response.meta_score,
        response.confidence,
        response.observations,
    ))
}

#[derive(Debug, Clone)]
pub struct MetaCritic {
    caller: LlmCaller,
}

impl MetaCritic {
    pub fn new(caller: LlmCaller) -> Self {
        Self { caller }
    }

    pub async fn assess(
        &self,
        history: &[EvaluationResult],
        content: &str,
        task: &TaskContext,
        cancel: &CancellationToken,
    ) -> DegradedResponse<LlmMetaAssessment> {
        let prompt = meta_prompt(history, content, task);
        let raw = match self.caller.call(Some(META_PREAMBLE), &prompt, cancel).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Meta-critic call failed; using neutral assessment");
                return fallback(DegradedReason::TransportFailure, &e.to_string());
            }
        };
        match parse_meta_assessment(&raw) {
            Ok(assessment) => DegradedResponse::full(assessment, "llm"),
            Err(reason) => {
                warn!(task_id = %task.id, %reason, "Meta-critic response rejected; using neutral assessment");
                fallback(reason, "meta-critic response unusable")
            }
        }
    }
}

fn fallback(reason: DegradedReason, warning: &str) -> DegradedResponse<LlmMetaAssessment> {
    DegradedResponse::partial(
        LlmMetaAssessment::fallback(),
        "fallback",
        LlmMetaAssessment::FALLBACK_CONFIDENCE,
        reason,
        warning,
    )
}

fn meta_prompt(history: &[EvaluationResult], content: &str, task: &TaskContext) -> String {
    let mut prompt = format!(
        "Below is the evaluation history for the task \"{}\" (type: {}), oldest first.\n\n",
        task.name, task.task_type
    );
    for result in history {
        let dims: Vec<String> = result
            .dimensions
            .iter()
            .map(|(d, score)| format!("{d}={score:.2}"))
            .collect();
        prompt.push_str(&format!(
            "- iteration {}: overall {:.2} ({})\n",
            result.iteration,
            result.overall_score,
            dims.join(", ")
        ));
    }
    let excerpt: String = content.chars().take(MAX_EXCERPT_CHARS).collect();
    prompt.push_str(&format!(
        "\nFinal content (excerpt):\n---\n{}\n---\n\n\
         Judge whether these scores are a consistent, unbiased assessment of the content. \
         Respond with ONLY a JSON object matching this schema:\n{}",
        excerpt.trim(),
        schema_json::<MetaAssessmentResponse>()
    ));
    prompt
}

/// Builds [`MetaReport`]s, optionally consulting a [`MetaCritic`].
#[derive(Debug, Clone, Default)]
pub struct MetaEvaluator {
    critic: Option<MetaCritic>,
}

impl MetaEvaluator {
    /// Statistics only; the model component always uses the fallback.
    pub fn deterministic() -> Self {
        Self { critic: None }
    }

    pub fn with_critic(critic: MetaCritic) -> Self {
        Self {
            critic: Some(critic),
        }
    }

    pub async fn analyze(
        &self,
        history: &[EvaluationResult],
        content: &str,
        task: &TaskContext,
        cancel: &CancellationToken,
    ) -> MetaReport {
        let assessment = match &self.critic {
            Some(critic) if !history.is_empty() => {
                critic.assess(history, content, task, cancel).await
            }
            Some(_) => DegradedResponse::unavailable(
                LlmMetaAssessment::fallback(),
                DegradedReason::MissingFields,
                "no evaluations to audit",
            ),
            None => DegradedResponse::unavailable(
                LlmMetaAssessment::fallback(),
                DegradedReason::Disabled,
                "meta-critic disabled",
            ),
        };
        let degraded = assessment.is_degraded();
        let report = build_report(history, &assessment.payload, degraded);
        info!(task_id = %task.id, status = %report.status_line(), llm_meta_degraded = degraded, "Meta-evaluation complete");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meta_assessment() {
        let raw = "```json\n{\"meta_score\": 0.8, \"confidence\": 0.7, \"observations\": [\"scores plausible\"]}\n```";
        let parsed = parse_meta_assessment(raw).unwrap();
        assert_eq!(parsed.meta_score, 0.8);
        assert_eq!(parsed.observations, vec!["scores plausible"]);
    }

    #[test]
    fn test_parse_meta_assessment_missing_confidence() {
        let err = parse_meta_assessment(r#"{"meta_score": 0.8}"#).unwrap_err();
        assert_eq!(err, DegradedReason::MissingFields);
        assert_eq!(parse_meta_assessment("fine").unwrap_err(), DegradedReason::ParseFailure);
    }

    #[test]
    fn test_meta_prompt_lists_history() {
        let task = TaskContext::new("t", "Climate summary", "summary");
        let history = vec![
            EvaluationResult::scored(0.5, evaluation::EvaluationDimensions::uniform(0.5), 0, 0.8),
            EvaluationResult::scored(0.7, evaluation::EvaluationDimensions::uniform(0.7), 1, 0.8),
        ];
        let prompt = meta_prompt(&history, "text", &task);
        assert!(prompt.contains("- iteration 0: overall 0.50"));
        assert!(prompt.contains("- iteration 1: overall 0.70"));
        assert!(prompt.contains("\"meta_score\""));
    }

    #[tokio::test]
    async fn test_deterministic_report_is_flagged() {
        let task = TaskContext::new("t", "Climate summary", "summary");
        let history: Vec<EvaluationResult> = [0.70, 0.72, 0.69]
            .iter()
            .enumerate()
            .map(|(i, s)| {
                EvaluationResult::scored(*s, evaluation::EvaluationDimensions::uniform(*s), i as u32, 0.8)
            })
            .collect();
        let report = MetaEvaluator::deterministic()
            .analyze(&history, "text", &task, &CancellationToken::new())
            .await;
        assert!(report.llm_meta_degraded);
        assert_eq!(report.meta_confidence, LlmMetaAssessment::FALLBACK_CONFIDENCE);
        assert_eq!(report.evaluation_count, 3);
        assert!(report.biases_detected.contains(&evaluation::BiasKind::Anchoring));
    }
}
