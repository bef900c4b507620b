//! Multi-expert consensus — JoinSet fan-out/fan-in over expert personas.
//!
//! ```text
//!   content
//!     │
//!     ├─ JoinSet::spawn(grade as expert_i) × N   (semaphore-bounded)
//!     │
//!     ├─ drop degraded verdicts, sort by profile index
//!     │
//!     └─ consensus::aggregate → EvaluationResult
//! ```
//!
//! Failed experts are dropped, not retried. Aggregation happens only after
//! every expert has finished or hit its deadline.

use std::sync::Arc;
use std::time::Instant;

use evaluation::consensus::{aggregate, ConsensusOutcome};
use evaluation::{EvaluationConfig, EvaluationResult, ExpertProfile, ExpertVerdict, TaskContext};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::LlmCaller;
use crate::strategies::llm_graded::LlmGradedStrategy;

/// Default cap on concurrent expert calls.
pub const DEFAULT_MAX_PARALLEL_EXPERTS: usize = 4;

#[derive(Debug, Clone)]
pub struct MultiExpertStrategy {
    caller: LlmCaller,
    config: EvaluationConfig,
    experts: Arc<Vec<ExpertProfile>>,
    max_parallel: usize,
}

impl MultiExpertStrategy {
    pub fn new(caller: LlmCaller, config: EvaluationConfig, experts: Vec<ExpertProfile>) -> Self {
        Self {
            caller,
            config,
            experts: Arc::new(experts),
            max_parallel: DEFAULT_MAX_PARALLEL_EXPERTS,
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn experts(&self) -> &[ExpertProfile] {
        &self.experts
    }

    pub async fn evaluate(
        &self,
        content: &str,
        task: &TaskContext,
        iteration: u32,
        cancel: &CancellationToken,
    ) -> EvaluationResult {
        self.consensus(content, task, iteration, cancel).await.result
    }

    /// Run every expert and aggregate the well-formed verdicts.
    pub async fn consensus(
        &self,
        content: &str,
        task: &TaskContext,
        iteration: u32,
        cancel: &CancellationToken,
    ) -> ConsensusOutcome {
        let verdicts = self.collect_verdicts(content, task, iteration, cancel).await;
        let outcome = aggregate(verdicts, self.experts.len(), iteration, &self.config);
        info!(
            task_id = %task.id,
            iteration,
            experts_succeeded = outcome.experts_succeeded,
            experts_total = outcome.experts_total,
            score = outcome.result.overall_score,
            confidence = outcome.confidence,
            disagreements = outcome.disagreements.len(),
            "Consensus reached"
        );
        outcome
    }

    // ── Fan-out ─────────────────────────────────────────────────────────

    async fn collect_verdicts(
        &self,
        content: &str,
        task: &TaskContext,
        iteration: u32,
        cancel: &CancellationToken,
    ) -> Vec<ExpertVerdict> {
        let sem = Arc::new(Semaphore::new(self.max_parallel));
        let content = Arc::new(content.to_string());
        let task = Arc::new(task.clone());
        let mut join_set: JoinSet<Option<ExpertVerdict>> = JoinSet::new();

        for (profile_index, profile) in self.experts.iter().enumerate() {
            let sem = sem.clone();
            let content = content.clone();
            let task = task.clone();
            let cancel = cancel.clone();
            let profile = profile.clone();
            let grader = LlmGradedStrategy::new(self.caller.clone(), self.config.clone())
                .with_persona(&profile);

            join_set.spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    warn!(expert = %profile.name, "Expert pool closed; skipping expert");
                    return None;
                };
                if cancel.is_cancelled() {
                    debug!(expert = %profile.name, "Run cancelled before expert call");
                    return None;
                }
                let start = Instant::now();
                let graded = grader.grade(&content, &task, iteration, &cancel).await;
                if graded.is_degraded() {
                    warn!(
                        task_id = %task.id,
                        expert = %profile.name,
                        reason = ?graded.reason,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Dropping expert with degraded verdict"
                    );
                    return None;
                }
                debug!(
                    expert = %profile.name,
                    score = graded.payload.result.overall_score,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Expert verdict"
                );
                let graded = graded.into_payload();
                Some(ExpertVerdict {
                    profile_index,
                    expert: profile.name.clone(),
                    weight: profile.weight,
                    result: graded.result,
                    strengths: graded.strengths,
                    concerns: graded.concerns,
                })
            });
        }

        let mut verdicts = Vec::with_capacity(self.experts.len());
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(Some(verdict)) => verdicts.push(verdict),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Expert worker panicked");
                }
            }
        }
        verdicts
    }
}
