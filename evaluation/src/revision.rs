//! Revision prompts built from the last evaluation.

use serde_json::Value;

use crate::config::StrategyKind;
use crate::consensus::Disagreement;
use crate::model::EvaluationResult;
use crate::rules::dimension_advice;

/// Number of weakest dimensions called out in a revision prompt.
pub const DEFAULT_FOCUS_DIMENSIONS: usize = 3;
/// Cap on listed suggestions so prompts stay bounded.
pub const MAX_LISTED_SUGGESTIONS: usize = 8;

/// Builds the prompt for iteration `n > 0` from the best content so far.
#[derive(Debug, Clone, Copy)]
pub struct RevisionPromptBuilder {
    kind: StrategyKind,
    focus_dimensions: usize,
}

impl RevisionPromptBuilder {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            focus_dimensions: DEFAULT_FOCUS_DIMENSIONS,
        }
    }

    pub fn with_focus_dimensions(mut self, n: usize) -> Self {
        self.focus_dimensions = n.max(1);
        self
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn build(
        &self,
        original_prompt: &str,
        content: &str,
        evaluation: &EvaluationResult,
        iteration: u32,
    ) -> String {
        let mut prompt = format!(
            "Revise the content below (revision {iteration}). It scored {:.2} overall and must improve.\n\n\
             ## Original task\n{}\n\n## Current content\n{}\n",
            evaluation.overall_score,
            original_prompt.trim(),
            content.trim()
        );

        prompt.push_str("\n## Weakest dimensions\n");
        for (dimension, score) in evaluation.lowest_dimensions(self.focus_dimensions) {
            prompt.push_str(&format!(
                "- {dimension} ({score:.2}): {}\n",
                dimension_advice(dimension)
            ));
        }

        if !evaluation.suggestions.is_empty() {
            prompt.push_str("\n## Reviewer suggestions\n");
            for suggestion in evaluation.suggestions.iter().take(MAX_LISTED_SUGGESTIONS) {
                prompt.push_str(&format!("- {suggestion}\n"));
            }
        }

        match self.kind {
            StrategyKind::RuleBased => {}
            StrategyKind::LlmGraded => {
                push_list(&mut prompt, "Strengths to preserve", &string_list(evaluation, "strengths"));
            }
            StrategyKind::MultiExpert => {
                let disagreements = disagreements(evaluation);
                if !disagreements.is_empty() {
                    prompt.push_str("\n## Reviewer disagreements\n");
                    for d in &disagreements {
                        prompt.push_str(&format!(
                            "- {}: {} rated {:.2} but {} rated {:.2}; address the lower rater's concerns without losing what the higher rater valued\n",
                            d.field, d.low_scorer, d.low, d.high_scorer, d.high
                        ));
                    }
                }
                push_list(&mut prompt, "Expert concerns", &string_list(evaluation, "concerns"));
            }
            StrategyKind::Adversarial => {
                let categories = evaluation
                    .metadata
                    .get("final_assessment")
                    .and_then(|a| a.get("top_categories"))
                    .map(json_strings)
                    .unwrap_or_default();
                push_list(&mut prompt, "Recurring critic attack areas", &categories);
            }
        }

        prompt.push_str(
            "\nKeep everything that already works. Return only the revised content, without commentary.\n",
        );
        prompt
    }
}

fn push_list(prompt: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    prompt.push_str(&format!("\n## {heading}\n"));
    for item in items.iter().take(MAX_LISTED_SUGGESTIONS) {
        prompt.push_str(&format!("- {item}\n"));
    }
}

fn json_strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn string_list(evaluation: &EvaluationResult, key: &str) -> Vec<String> {
    evaluation.metadata.get(key).map(json_strings).unwrap_or_default()
}

fn disagreements(evaluation: &EvaluationResult) -> Vec<Disagreement> {
    evaluation
        .metadata
        .get("disagreements")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EvaluationDimensions;

    fn evaluation() -> EvaluationResult {
        let dims = EvaluationDimensions::new(0.9, 0.3, 0.8, 0.4, 0.7, 0.2);
        EvaluationResult::scored(0.55, dims, 1, 0.8)
            .with_suggestions(vec!["Add a conclusion".to_string()])
    }

    #[test]
    fn test_prompt_lists_weakest_dimensions_and_suggestions() {
        let prompt = RevisionPromptBuilder::new(StrategyKind::RuleBased).build(
            "Write a summary of CRISPR safety",
            "CRISPR is a tool.",
            &evaluation(),
            1,
        );
        assert!(prompt.contains("Write a summary of CRISPR safety"));
        assert!(prompt.contains("CRISPR is a tool."));
        assert!(prompt.contains("- scientific_rigor (0.20)"));
        assert!(prompt.contains("- completeness (0.30)"));
        assert!(prompt.contains("- clarity (0.40)"));
        assert!(!prompt.contains("- relevance"));
        assert!(prompt.contains("- Add a conclusion"));
    }

    #[test]
    fn test_multi_expert_prompt_includes_disagreements() {
        let disagreement = Disagreement {
            field: "overall_score".to_string(),
            low_scorer: "statistician".to_string(),
            high_scorer: "science communicator".to_string(),
            low: 0.4,
            high: 0.9,
        };
        let eval = evaluation()
            .with_metadata("disagreements", serde_json::json!([disagreement]))
            .with_metadata("concerns", serde_json::json!(["No sample sizes reported"]));
        let prompt = RevisionPromptBuilder::new(StrategyKind::MultiExpert).build("task", "body", &eval, 2);
        assert!(prompt.contains("statistician rated 0.40"));
        assert!(prompt.contains("No sample sizes reported"));
    }

    #[test]
    fn test_adversarial_prompt_includes_attack_areas() {
        let eval = evaluation().with_metadata(
            "final_assessment",
            serde_json::json!({"top_categories": ["accuracy", "structure"]}),
        );
        let prompt = RevisionPromptBuilder::new(StrategyKind::Adversarial).build("task", "body", &eval, 1);
        assert!(prompt.contains("Recurring critic attack areas"));
        assert!(prompt.contains("- structure"));
    }

    #[test]
    fn test_missing_metadata_is_tolerated() {
        let prompt = RevisionPromptBuilder::new(StrategyKind::MultiExpert)
            .with_focus_dimensions(1)
            .build("task", "body", &evaluation(), 1);
        assert!(!prompt.contains("disagreements"));
        assert!(prompt.contains("- scientific_rigor"));
        assert!(!prompt.contains("- completeness"));
    }
}
