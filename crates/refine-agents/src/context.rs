//! Static task-context resolver.

use std::collections::HashMap;

use async_trait::async_trait;
use evaluation::TaskContext;

use crate::errors::TaskContextError;
use crate::ports::TaskContextPort;

/// Resolves task references from a fixed table keyed by task id.
#[derive(Debug, Clone, Default)]
pub struct StaticTaskContexts {
    tasks: HashMap<String, TaskContext>,
}

impl StaticTaskContexts {
    pub fn new(tasks: impl IntoIterator<Item = TaskContext>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    pub fn insert(&mut self, task: TaskContext) {
        self.tasks.insert(task.id.clone(), task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskContextPort for StaticTaskContexts {
    async fn resolve(&self, task_ref: &str) -> Result<TaskContext, TaskContextError> {
        self.tasks
            .get(task_ref.trim())
            .cloned()
            .ok_or_else(|| TaskContextError::NotFound(task_ref.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_known_and_unknown() {
        let contexts = StaticTaskContexts::new([TaskContext::new("t-1", "CRISPR overview", "review")]);
        let task = contexts.resolve(" t-1 ").await.unwrap();
        assert_eq!(task.name, "CRISPR overview");
        let err = contexts.resolve("t-2").await.unwrap_err();
        assert!(matches!(err, TaskContextError::NotFound(ref id) if id == "t-2"));
    }
}
