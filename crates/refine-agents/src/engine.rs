//! Engine — ports, run pool and strategy construction in one place.
//!
//! Every run goes through [`Engine::run_evaluation_loop`], which holds a
//! permit from the run pool for the whole loop. Batches fan out with a
//! `JoinSet`; results come back in submission order.
//!
//! Persistence handed to the engine is wrapped in
//! [`TaskSerializedPersistence`] so writes for one task id never interleave.

use std::path::Path;
use std::sync::Arc;

use evaluation::{EvaluationConfig, EvaluationResult, MetaReport, StrategyKind, TaskContext};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::controller::{IterationController, RunResult};
use crate::errors::{EngineConfigError, PersistenceError};
use crate::llm::LlmCaller;
use crate::meta::{MetaCritic, MetaEvaluator};
use crate::persistence::TaskSerializedPersistence;
use crate::ports::{ContentGenerationPort, PersistencePort, TaskContextPort};
use crate::rig_adapter::RigGenerator;
use crate::strategies::EvaluationStrategy;

/// One run submitted to [`Engine::run_batch`].
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub initial_prompt: String,
    pub task: TaskContext,
    /// Overrides the engine's evaluation config.
    pub config: Option<EvaluationConfig>,
    /// Overrides the engine's strategy.
    pub strategy: Option<StrategyKind>,
}

impl RunRequest {
    pub fn new(initial_prompt: impl Into<String>, task: TaskContext) -> Self {
        Self {
            initial_prompt: initial_prompt.into(),
            task,
            config: None,
            strategy: None,
        }
    }

    pub fn with_config(mut self, config: EvaluationConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    generator: LlmCaller,
    persistence: Arc<dyn PersistencePort>,
    contexts: Option<Arc<dyn TaskContextPort>>,
    pool: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        generator: Arc<dyn ContentGenerationPort>,
        persistence: Arc<dyn PersistencePort>,
    ) -> Self {
        let generator = LlmCaller::new(generator, config.llm.call_timeout());
        let pool = Arc::new(Semaphore::new(config.pool.max_concurrent_runs.max(1)));
        Self {
            persistence: Arc::new(TaskSerializedPersistence::new(persistence)),
            generator,
            contexts: None,
            pool,
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Engine backed by the configured OpenAI-compatible endpoint.
    pub fn from_config(
        config: EngineConfig,
        persistence: Arc<dyn PersistencePort>,
    ) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!(EngineConfigError::Invalid(e)))?;
        let generator = RigGenerator::from_config(&config.llm)?;
        Ok(Self::new(config, Arc::new(generator), persistence))
    }

    /// Load config from `path` (plus environment) and build a Rig-backed engine.
    pub fn from_config_file(
        path: Option<&Path>,
        persistence: Arc<dyn PersistencePort>,
    ) -> anyhow::Result<Self> {
        let config = EngineConfig::load(path)?;
        Self::from_config(config, persistence)
    }

    pub fn with_task_contexts(mut self, contexts: Arc<dyn TaskContextPort>) -> Self {
        self.contexts = Some(contexts);
        self
    }

    /// Tie this engine's runs to an externally owned token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token cancelling every run of this engine.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        info!("Cancelling all runs");
        self.cancel.cancel();
    }

    /// Build a strategy with this engine's ports injected.
    pub fn strategy(&self, kind: StrategyKind, config: &EvaluationConfig) -> EvaluationStrategy {
        EvaluationStrategy::build(
            kind,
            config,
            &self.generator,
            &self.config.experts,
            &self.config.arena,
        )
    }

    /// Run with the engine's configured evaluation config and strategy.
    pub async fn run(&self, initial_prompt: &str, task: &TaskContext) -> RunResult {
        self.run_evaluation_loop(initial_prompt, task, &self.config.evaluation, self.config.strategy)
            .await
    }

    pub async fn run_evaluation_loop(
        &self,
        initial_prompt: &str,
        task: &TaskContext,
        config: &EvaluationConfig,
        strategy: StrategyKind,
    ) -> RunResult {
        if let Err(e) = config.validate() {
            error!(task_id = %task.id, error = %e, "Rejecting run with invalid config");
            return RunResult::failed_before_start(&task.id, &format!("invalid config: {e}"));
        }

        let _permit = match self.pool.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Run pool closed");
                return RunResult::failed_before_start(&task.id, "run pool closed");
            }
        };

        let controller = IterationController::new(
            self.generator.clone(),
            self.strategy(strategy, config),
            self.persistence.clone(),
            config.clone(),
        )
        .with_cancellation(self.cancel.child_token());
        controller.run(initial_prompt, task).await
    }

    /// Run many loops through the pool; results follow submission order.
    pub async fn run_batch(&self, requests: Vec<RunRequest>) -> Vec<RunResult> {
        let task_ids: Vec<String> = requests.iter().map(|r| r.task.id.clone()).collect();
        let mut slots: Vec<Option<RunResult>> = vec![None; requests.len()];
        let mut join_set: JoinSet<(usize, RunResult)> = JoinSet::new();

        info!(runs = requests.len(), max_concurrent = self.config.pool.max_concurrent_runs, "Submitting batch");
        for (index, request) in requests.into_iter().enumerate() {
            let engine = self.clone();
            join_set.spawn(async move {
                let config = request
                    .config
                    .unwrap_or_else(|| engine.config.evaluation.clone());
                let strategy = request.strategy.unwrap_or(engine.config.strategy);
                let result = engine
                    .run_evaluation_loop(&request.initial_prompt, &request.task, &config, strategy)
                    .await;
                (index, result)
            });
        }

        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "Run worker panicked"),
            }
        }

        slots
            .into_iter()
            .zip(task_ids)
            .map(|(slot, task_id)| {
                slot.unwrap_or_else(|| RunResult::failed_before_start(&task_id, "run worker aborted"))
            })
            .collect()
    }

    /// Resolve `task_ref` through the task-context port, then run.
    pub async fn run_task(&self, task_ref: &str, initial_prompt: &str) -> RunResult {
        let Some(contexts) = &self.contexts else {
            warn!(task_ref, "No task context resolver configured");
            return RunResult::failed_before_start(task_ref, "no task context resolver");
        };
        match contexts.resolve(task_ref).await {
            Ok(task) => self.run(initial_prompt, &task).await,
            Err(e) => {
                warn!(task_ref, error = %e, "Task resolution failed");
                RunResult::failed_before_start(task_ref, &e.to_string())
            }
        }
    }

    fn meta_evaluator(&self) -> MetaEvaluator {
        if self.config.meta.llm_meta_enabled {
            MetaEvaluator::with_critic(MetaCritic::new(self.generator.clone()))
        } else {
            MetaEvaluator::deterministic()
        }
    }

    pub async fn analyze_history(
        &self,
        history: &[EvaluationResult],
        content: &str,
        task: &TaskContext,
    ) -> MetaReport {
        self.meta_evaluator()
            .analyze(history, content, task, &self.cancel.child_token())
            .await
    }

    /// Load a task's persisted history and audit it.
    pub async fn analyze_task(&self, task_id: &str, content: &str) -> Result<MetaReport, PersistenceError> {
        let history = self.persistence.load_history(task_id).await?;
        let task = match &self.contexts {
            Some(contexts) => contexts.resolve(task_id).await.unwrap_or_else(|e| {
                warn!(task_id, error = %e, "Task resolution failed; analysing with bare context");
                TaskContext::new(task_id, task_id, "unknown")
            }),
            None => TaskContext::new(task_id, task_id, "unknown"),
        };
        Ok(self.analyze_history(&history, content, &task).await)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("strategy", &self.config.strategy)
            .field("max_concurrent_runs", &self.config.pool.max_concurrent_runs)
            .field("available_permits", &self.pool.available_permits())
            .finish_non_exhaustive()
    }
}
