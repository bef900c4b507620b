//! Reference persistence adapters.
//!
//! - [`InMemoryPersistence`] : per-task ordered log, for tests and the CLI.
//! - [`TaskSerializedPersistence`] : decorator serializing writes per task id
//!   while distinct tasks proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use evaluation::EvaluationResult;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::PersistenceError;
use crate::ports::{EvaluationRecord, PersistencePort};

#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    records: Mutex<HashMap<String, Vec<EvaluationRecord>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw records for `task_id`, in append order.
    pub async fn records(&self, task_id: &str) -> Vec<EvaluationRecord> {
        self.records
            .lock()
            .await
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn total_records(&self) -> usize {
        self.records.lock().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl PersistencePort for InMemoryPersistence {
    async fn append_evaluation(&self, record: EvaluationRecord) -> Result<(), PersistenceError> {
        let mut records = self.records.lock().await;
        records.entry(record.task_id.clone()).or_default().push(record);
        Ok(())
    }

    async fn load_history(&self, task_id: &str) -> Result<Vec<EvaluationResult>, PersistenceError> {
        let records = self.records.lock().await;
        Ok(records
            .get(task_id)
            .map(|log| log.iter().map(EvaluationRecord::to_result).collect())
            .unwrap_or_default())
    }
}

/// Holds one async mutex per task id in front of any [`PersistencePort`].
pub struct TaskSerializedPersistence {
    inner: Arc<dyn PersistencePort>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TaskSerializedPersistence {
    pub fn new(inner: Arc<dyn PersistencePort>) -> Self {
        Self {
            inner,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, task_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the task's lock entry once no other caller holds or awaits it.
    async fn release(&self, task_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        let idle = locks
            .get(task_id)
            .is_some_and(|held| Arc::ptr_eq(held, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(task_id);
        }
    }

    /// Task ids that currently have a lock entry.
    pub async fn tracked_tasks(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[async_trait]
impl PersistencePort for TaskSerializedPersistence {
    async fn append_evaluation(&self, record: EvaluationRecord) -> Result<(), PersistenceError> {
        let task_id = record.task_id.clone();
        let lock = self.lock_for(&task_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            debug!(task_id = %task_id, iteration = record.iteration, "Persisting evaluation");
            self.inner.append_evaluation(record).await
        };
        self.release(&task_id, lock).await;
        outcome
    }

    async fn load_history(&self, task_id: &str) -> Result<Vec<EvaluationResult>, PersistenceError> {
        let lock = self.lock_for(task_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.inner.load_history(task_id).await
        };
        self.release(task_id, lock).await;
        outcome
    }
}
