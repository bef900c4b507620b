//! Persistence failures are logged and counted, never fatal.

use std::sync::Arc;

use async_trait::async_trait;
use evaluation::{EvaluationConfig, EvaluationResult, StrategyKind, TaskContext};
use mockall::mock;
use mockall::predicate::function;
use refine_agents::controller::IterationController;
use refine_agents::errors::{GenerationError, PersistenceError};
use refine_agents::llm::{LlmCaller, DEFAULT_CALL_TIMEOUT};
use refine_agents::ports::{ContentGenerationPort, EvaluationRecord, PersistencePort};
use refine_agents::strategies::EvaluationStrategy;
use refine_agents::{Engine, EngineConfig, RunStatus};

mock! {
    pub Store {}

    #[async_trait]
    impl PersistencePort for Store {
        async fn append_evaluation(&self, record: EvaluationRecord) -> Result<(), PersistenceError>;
        async fn load_history(&self, task_id: &str) -> Result<Vec<EvaluationResult>, PersistenceError>;
    }
}

struct FixedPort(&'static str);

#[async_trait]
impl ContentGenerationPort for FixedPort {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Ok(self.0.to_string())
    }
}

fn task() -> TaskContext {
    TaskContext::new("t-9", "Ocean acidification", "summary")
}

#[tokio::test]
async fn failing_writes_do_not_abort_the_run() {
    let mut store = MockStore::new();
    store
        .expect_append_evaluation()
        .times(2)
        .returning(|_| Err(PersistenceError::Unavailable("database down".into())));

    let config = EvaluationConfig::default().with_max_iterations(2);
    let caller = LlmCaller::new(Arc::new(FixedPort("Short text.")), DEFAULT_CALL_TIMEOUT);
    let strategy = EvaluationStrategy::build(
        StrategyKind::RuleBased,
        &config,
        &caller,
        &[],
        &Default::default(),
    );
    let controller = IterationController::new(caller, strategy, Arc::new(store), config);

    let run = controller.run("Summarise ocean acidification.", &task()).await;

    assert_eq!(run.iterations_used, 2);
    assert_eq!(run.persistence_failures, 2);
    assert_eq!(run.history.len(), 2);
    assert!(run.content.is_some());
    assert!(run.status_line().contains("2 persistence failures"));
}

#[tokio::test]
async fn records_carry_task_and_iteration() {
    let mut store = MockStore::new();
    let mut seq = mockall::Sequence::new();
    for expected in 0..3u32 {
        store
            .expect_append_evaluation()
            .with(function(move |r: &EvaluationRecord| {
                r.task_id == "t-9" && r.iteration == expected && r.dimension_scores.len() == 6
            }))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
    }

    let mut cfg = EngineConfig::default();
    cfg.evaluation.max_iterations = 3;
    cfg.evaluation.quality_threshold = 1.0;
    cfg.meta.llm_meta_enabled = false;
    let engine = Engine::new(cfg, Arc::new(FixedPort("Short text.")), Arc::new(store));

    let run = engine.run("Summarise.", &task()).await;

    assert_eq!(run.iterations_used, 3);
    assert_eq!(run.persistence_failures, 0);
    assert_ne!(run.status, RunStatus::Done);
}

#[tokio::test]
async fn history_load_failure_surfaces_from_analyze_task() {
    let mut store = MockStore::new();
    store
        .expect_load_history()
        .returning(|_| Err(PersistenceError::Unavailable("database down".into())));

    let mut cfg = EngineConfig::default();
    cfg.meta.llm_meta_enabled = false;
    let engine = Engine::new(cfg, Arc::new(FixedPort("x")), Arc::new(store));

    let err = engine.analyze_task("t-9", "content").await.unwrap_err();
    assert!(matches!(err, PersistenceError::Unavailable(_)));
}
