//! Iteration controller — generate, evaluate, persist, keep the best.
//!
//! One controller drives one run. Iterations are strictly sequential; the
//! controller owns its best candidate and history outright. Nothing inside
//! the loop raises: generation failures consume a slot, evaluation failures
//! arrive as degraded results, persistence failures are counted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use evaluation::{EvaluationConfig, EvaluationResult, TaskContext};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::llm::LlmCaller;
use crate::ports::{EvaluationRecord, PersistencePort};
use crate::state_machine::{LoopState, StateMachine, TransitionRecord};
use crate::strategies::EvaluationStrategy;

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// A candidate met the quality threshold.
    Done,
    /// Best candidate is below threshold but at or above the review line.
    NeedsReview,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::NeedsReview => write!(f, "needs_review"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub task_id: String,
    pub status: RunStatus,
    /// Best candidate content; absent when nothing was ever evaluated.
    pub content: Option<String>,
    /// Evaluation of `content`.
    pub evaluation: Option<EvaluationResult>,
    /// Iterations that produced an evaluation.
    pub iterations_used: u32,
    #[serde(with = "duration_ms")]
    pub execution_time: Duration,
    pub cancelled: bool,
    pub persistence_failures: u32,
    /// Every evaluation in iteration order.
    pub history: Vec<EvaluationResult>,
    /// Best score after each evaluated iteration; never decreases.
    pub best_trajectory: Vec<f64>,
    pub transitions: Vec<TransitionRecord>,
}

impl RunResult {
    /// A run that ended before any iteration, e.g. an unresolvable task.
    pub fn failed_before_start(task_id: &str, reason: &str) -> Self {
        let mut sm = StateMachine::new();
        if let Err(e) = sm.fail(reason) {
            warn!(task_id, error = %e, "Could not record failure transition");
        }
        Self {
            run_id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            status: RunStatus::Failed,
            content: None,
            evaluation: None,
            iterations_used: 0,
            execution_time: Duration::ZERO,
            cancelled: false,
            persistence_failures: 0,
            history: Vec::new(),
            best_trajectory: Vec::new(),
            transitions: sm.into_transitions(),
        }
    }

    pub fn best_score(&self) -> Option<f64> {
        self.evaluation.as_ref().map(|e| e.overall_score)
    }

    /// e.g. `[needs_review] task t-1 | best 0.75 | 3 iterations | 1 persistence failures`.
    pub fn status_line(&self) -> String {
        let mut line = format!(
            "[{}] task {} | best {} | {} iterations",
            self.status,
            self.task_id,
            self.best_score()
                .map_or_else(|| "none".to_string(), |s| format!("{s:.2}")),
            self.iterations_used
        );
        if self.persistence_failures > 0 {
            line.push_str(&format!(" | {} persistence failures", self.persistence_failures));
        }
        if self.cancelled {
            line.push_str(" | cancelled");
        }
        line
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    content: String,
    evaluation: EvaluationResult,
}

pub struct IterationController {
    generator: LlmCaller,
    strategy: EvaluationStrategy,
    persistence: Arc<dyn PersistencePort>,
    config: EvaluationConfig,
    cancel: CancellationToken,
}

impl IterationController {
    pub fn new(
        generator: LlmCaller,
        strategy: EvaluationStrategy,
        persistence: Arc<dyn PersistencePort>,
        config: EvaluationConfig,
    ) -> Self {
        Self {
            generator,
            strategy,
            persistence,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn strategy(&self) -> &EvaluationStrategy {
        &self.strategy
    }

    pub async fn run(&self, initial_prompt: &str, task: &TaskContext) -> RunResult {
        let run_id = Uuid::new_v4();
        let run_label = run_id.to_string();
        let start = Instant::now();
        let threshold = self.config.quality_threshold;
        let builder = self.strategy.revision_builder();

        let mut sm = StateMachine::new();
        if let Err(e) = sm.advance(LoopState::Iterating, Some("loop started")) {
            warn!(task_id = %task.id, error = %e, "Unexpected state on loop start");
        }

        let mut best: Option<Candidate> = None;
        let mut last_evaluation: Option<EvaluationResult> = None;
        let mut history = Vec::new();
        let mut best_trajectory = Vec::new();
        let mut iterations_used = 0u32;
        let mut persistence_failures = 0u32;
        let mut cancelled = false;
        let mut succeeded = false;

        info!(
            %run_id,
            task_id = %task.id,
            strategy = %self.strategy.kind(),
            threshold,
            max_iterations = self.config.max_iterations,
            "Starting evaluation loop"
        );

        for iteration in 0..self.config.max_iterations {
            if self.cancel.is_cancelled() {
                info!(%run_id, iteration, "Run cancelled");
                cancelled = true;
                break;
            }
            sm.set_iteration(iteration);

            let prompt = match (&best, &last_evaluation) {
                (Some(candidate), Some(last)) => {
                    builder.build(initial_prompt, &candidate.content, last, iteration)
                }
                _ => initial_prompt.to_string(),
            };

            debug!(%run_id, iteration, prompt_len = prompt.len(), "Generating candidate");
            let generated = match self.generator.call(None, &prompt, &self.cancel).await {
                Ok(content) => content,
                Err(e) if e.is_cancelled() => {
                    info!(%run_id, iteration, "Run cancelled during generation");
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(%run_id, iteration, error = %e, category = %e.category(), "Generation failed; slot consumed");
                    continue;
                }
            };

            let evaluation = self
                .strategy
                .evaluate(&generated, task, iteration, threshold, &self.cancel)
                .await;
            // A result produced under cancellation is a fallback, not a judgment.
            if self.cancel.is_cancelled() {
                info!(%run_id, iteration, "Run cancelled during evaluation; result discarded");
                cancelled = true;
                break;
            }
            let content = evaluation.refined_content.clone().unwrap_or(generated);
            iterations_used += 1;

            let record = EvaluationRecord::new(&task.id, &run_label, &content, &evaluation);
            if let Err(e) = self.persistence.append_evaluation(record).await {
                error!(%run_id, task_id = %task.id, iteration, error = %e, "Failed to persist evaluation");
                persistence_failures += 1;
            }

            let score = evaluation.overall_score;
            info!(
                %run_id,
                iteration,
                score,
                degraded = evaluation.is_degraded(),
                best = best.as_ref().map(|b| b.evaluation.overall_score),
                "Evaluation scored"
            );
            history.push(evaluation.clone());

            if score >= threshold {
                best = Some(Candidate {
                    content,
                    evaluation,
                });
                best_trajectory.push(score);
                succeeded = true;
                break;
            }

            let replace = best
                .as_ref()
                .map_or(true, |b| self.config.improves_on(score, b.evaluation.overall_score));
            if replace {
                debug!(%run_id, iteration, score, "New best candidate");
                best = Some(Candidate {
                    content,
                    evaluation: evaluation.clone(),
                });
            }
            if let Some(b) = &best {
                best_trajectory.push(b.evaluation.overall_score);
            }
            last_evaluation = Some(evaluation);
        }

        if !succeeded && self.cancel.is_cancelled() {
            cancelled = true;
        }
        let status = self.finish(&mut sm, best.as_ref(), succeeded, cancelled);
        let (content, evaluation) = match best {
            Some(c) => (Some(c.content), Some(c.evaluation)),
            None => (None, None),
        };

        let result = RunResult {
            run_id,
            task_id: task.id.clone(),
            status,
            content,
            evaluation,
            iterations_used,
            execution_time: start.elapsed(),
            cancelled,
            persistence_failures,
            history,
            best_trajectory,
            transitions: sm.into_transitions(),
        };
        info!(%run_id, summary = %result.status_line(), "Evaluation loop finished");
        result
    }

    fn finish(
        &self,
        sm: &mut StateMachine,
        best: Option<&Candidate>,
        succeeded: bool,
        cancelled: bool,
    ) -> RunStatus {
        let (state, status, reason) = match best {
            Some(_) if succeeded => (LoopState::Succeeded, RunStatus::Done, "threshold met"),
            _ if cancelled => (LoopState::Failed, RunStatus::Failed, "cancelled"),
            None => (LoopState::Failed, RunStatus::Failed, "no candidate produced"),
            Some(c) if c.evaluation.overall_score >= self.config.review_threshold => (
                LoopState::PartialSuccess,
                RunStatus::NeedsReview,
                "best candidate needs review",
            ),
            Some(_) => (
                LoopState::PartialSuccess,
                RunStatus::Failed,
                "best candidate below review threshold",
            ),
        };
        if let Err(e) = sm.advance(state, Some(reason)) {
            warn!(error = %e, "Could not record terminal transition");
        }
        status
    }
}
