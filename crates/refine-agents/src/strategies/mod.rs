//! Evaluation strategies.
//!
//! | Strategy      | Model calls per evaluation                     |
//! |---------------|------------------------------------------------|
//! | `rule_based`  | none                                           |
//! | `llm_graded`  | 1 grading + 1 suggestion call if any dim weak  |
//! | `multi_expert`| one `llm_graded` evaluation per expert         |
//! | `adversarial` | up to 2 per arena round (critic + generator)   |
//!
//! Every strategy short-circuits empty content before touching the port and
//! never returns an error: failures degrade to fallback results.

pub mod adversarial;
pub mod llm_graded;
pub mod multi_expert;
pub mod rule_based;

use evaluation::{
    ArenaConfig, EvaluationConfig, EvaluationResult, ExpertProfile, RevisionPromptBuilder,
    StrategyKind, TaskContext,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::llm::LlmCaller;

pub use adversarial::AdversarialStrategy;
pub use llm_graded::LlmGradedStrategy;
pub use multi_expert::MultiExpertStrategy;
pub use rule_based::RuleBasedStrategy;

/// The four evaluation strategies.
#[derive(Debug, Clone)]
pub enum EvaluationStrategy {
    RuleBased(RuleBasedStrategy),
    LlmGraded(LlmGradedStrategy),
    MultiExpert(MultiExpertStrategy),
    Adversarial(AdversarialStrategy),
}

impl EvaluationStrategy {
    /// Build the variant for `kind`, injecting the generation port where needed.
    pub fn build(
        kind: StrategyKind,
        config: &EvaluationConfig,
        caller: &LlmCaller,
        experts: &[ExpertProfile],
        arena: &ArenaConfig,
    ) -> Self {
        match kind {
            StrategyKind::RuleBased => Self::RuleBased(RuleBasedStrategy::new(config.clone())),
            StrategyKind::LlmGraded => {
                Self::LlmGraded(LlmGradedStrategy::new(caller.clone(), config.clone()))
            }
            StrategyKind::MultiExpert => Self::MultiExpert(MultiExpertStrategy::new(
                caller.clone(),
                config.clone(),
                experts.to_vec(),
            )),
            StrategyKind::Adversarial => Self::Adversarial(AdversarialStrategy::new(
                caller.clone(),
                config.clone(),
                arena.clone(),
            )),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::RuleBased(_) => StrategyKind::RuleBased,
            Self::LlmGraded(_) => StrategyKind::LlmGraded,
            Self::MultiExpert(_) => StrategyKind::MultiExpert,
            Self::Adversarial(_) => StrategyKind::Adversarial,
        }
    }

    /// Revision prompt builder matching this strategy's feedback shape.
    pub fn revision_builder(&self) -> RevisionPromptBuilder {
        RevisionPromptBuilder::new(self.kind())
    }

    pub async fn evaluate(
        &self,
        content: &str,
        task: &TaskContext,
        iteration: u32,
        threshold: f64,
        cancel: &CancellationToken,
    ) -> EvaluationResult {
        if content.trim().is_empty() {
            debug!(task_id = %task.id, iteration, strategy = %self.kind(), "Empty content; skipping evaluation");
            return EvaluationResult::empty_content(iteration, threshold)
                .with_metadata("strategy", self.kind().as_str());
        }
        match self {
            Self::RuleBased(s) => s.evaluate(content, task, iteration),
            Self::LlmGraded(s) => s.evaluate(content, task, iteration, cancel).await,
            Self::MultiExpert(s) => s.evaluate(content, task, iteration, cancel).await,
            Self::Adversarial(s) => s.evaluate(content, task, iteration, cancel).await,
        }
    }
}
