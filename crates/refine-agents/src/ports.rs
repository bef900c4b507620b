//! Ports to the collaborators the engine does not own.
//!
//! The engine is handed implementations of these traits at construction
//! time. Reference adapters live in [`crate::persistence`],
//! [`crate::context`] and [`crate::rig_adapter`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evaluation::{EvaluationDimensions, EvaluationResult, TaskContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{GenerationError, PersistenceError, TaskContextError};

/// Text generation backed by a language model.
#[async_trait]
pub trait ContentGenerationPort: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Generate under a system preamble. Adapters with native system-prompt
    /// support should override this.
    async fn generate_with_preamble(
        &self,
        preamble: &str,
        prompt: &str,
    ) -> Result<String, GenerationError> {
        let combined = format!("{preamble}\n\n{prompt}");
        self.generate(&combined).await
    }
}

/// Durable, append-only log of per-iteration evaluations.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn append_evaluation(&self, record: EvaluationRecord) -> Result<(), PersistenceError>;

    /// Evaluations recorded for `task_id`, in append order.
    async fn load_history(&self, task_id: &str) -> Result<Vec<EvaluationResult>, PersistenceError>;
}

/// Resolves a task reference to its context.
#[async_trait]
pub trait TaskContextPort: Send + Sync {
    async fn resolve(&self, task_ref: &str) -> Result<TaskContext, TaskContextError>;
}

/// One persisted iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub task_id: String,
    pub run_id: String,
    pub iteration: u32,
    pub content: String,
    pub overall_score: f64,
    pub dimension_scores: BTreeMap<String, f64>,
    pub suggestions: Vec<String>,
    pub needs_revision: bool,
    pub metadata: BTreeMap<String, Value>,
    pub recorded_at: DateTime<Utc>,
}

impl EvaluationRecord {
    pub fn new(task_id: &str, run_id: &str, content: &str, result: &EvaluationResult) -> Self {
        Self {
            task_id: task_id.to_string(),
            run_id: run_id.to_string(),
            iteration: result.iteration,
            content: content.to_string(),
            overall_score: result.overall_score,
            dimension_scores: result.dimensions.to_map(),
            suggestions: result.suggestions.clone(),
            needs_revision: result.needs_revision,
            metadata: result.metadata.clone(),
            recorded_at: Utc::now(),
        }
    }

    /// Rebuild the evaluation this record was written from.
    ///
    /// `needs_revision` is taken as recorded, since the threshold that
    /// produced it is not part of the record.
    pub fn to_result(&self) -> EvaluationResult {
        let score = |name: &str| self.dimension_scores.get(name).copied().unwrap_or(0.0);
        let dimensions = EvaluationDimensions::new(
            score("relevance"),
            score("completeness"),
            score("accuracy"),
            score("clarity"),
            score("coherence"),
            score("scientific_rigor"),
        );
        let mut result = EvaluationResult::scored(self.overall_score, dimensions, self.iteration, 0.0)
            .with_suggestions(self.suggestions.clone());
        result.needs_revision = self.needs_revision;
        result.metadata = self.metadata.clone();
        result
    }
}
