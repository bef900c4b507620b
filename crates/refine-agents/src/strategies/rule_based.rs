//! Deterministic strategy: rule-based scoring with no model calls.

use evaluation::{EvaluationConfig, EvaluationResult, RuleBasedScorer, TaskContext};

#[derive(Debug, Clone, Default)]
pub struct RuleBasedStrategy {
    scorer: RuleBasedScorer,
}

impl RuleBasedStrategy {
    pub fn new(config: EvaluationConfig) -> Self {
        Self {
            scorer: RuleBasedScorer::new(config),
        }
    }

    pub fn evaluate(&self, content: &str, task: &TaskContext, iteration: u32) -> EvaluationResult {
        self.scorer.evaluate(content, task, iteration)
    }
}
