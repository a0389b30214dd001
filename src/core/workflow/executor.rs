#![allow(clippy::result_large_err)] // Executor trait returns AppError for structured task diagnostics.

use crate::core::error::AppError;
use crate::core::workflow::document::{TaskKind, TaskSpec, WorkflowDocument};
use crate::core::workflow::run::{TaskInstanceState, WorkflowRun};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait implemented by task executors. An executor reads the task's params
/// and resolved input values from `state`, performs the work, and writes
/// `output_values` back. Returning Err marks the task Failed; an executor may
/// also set `state.kind` to Skipped itself.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Executor name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Task kind this executor handles.
    fn kind(&self) -> TaskKind;

    async fn execute(
        &self,
        document: &WorkflowDocument,
        run: &WorkflowRun,
        task: &TaskSpec,
        state: &mut TaskInstanceState,
    ) -> Result<(), AppError>;
}

/// Builder used to register executors before the orchestrator starts.
pub struct ExecutorRegistryBuilder {
    executors: HashMap<TaskKind, Arc<dyn TaskExecutor>>,
}

impl Default for ExecutorRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorRegistryBuilder {
    pub fn new() -> Self {
        ExecutorRegistryBuilder {
            executors: HashMap::new(),
        }
    }

    pub fn register<T: TaskExecutor>(&mut self, executor: T) -> &mut Self {
        let kind = executor.kind();
        if self.executors.contains_key(&kind) {
            panic!("duplicate executor registered for kind: {}", kind.as_str());
        }
        self.executors.insert(kind, Arc::new(executor));
        self
    }

    pub fn build(self) -> ExecutorRegistry {
        ExecutorRegistry {
            inner: Arc::new(self.executors),
        }
    }
}

/// Immutable kind -> executor lookup available during workflow execution.
#[derive(Clone)]
pub struct ExecutorRegistry {
    inner: Arc<HashMap<TaskKind, Arc<dyn TaskExecutor>>>,
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        ExecutorRegistryBuilder::new().build()
    }

    pub fn builder() -> ExecutorRegistryBuilder {
        ExecutorRegistryBuilder::new()
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskExecutor>> {
        self.inner.get(&kind).cloned()
    }
}
