use crate::core::error::AppError;
use crate::core::workflow::document::{TaskKind, TaskSpec, WorkflowDocument};
use crate::core::workflow::executor::TaskExecutor;
use crate::core::workflow::run::{TaskInstanceState, WorkflowRun};
use async_trait::async_trait;

/// Executor for `internal` tasks: performs no external work and passes
/// same-named resolved inputs through to output slots, so dataflow keeps
/// flowing across bookkeeping tasks.
pub struct InternalExecutor;

impl InternalExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InternalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskExecutor for InternalExecutor {
    fn name(&self) -> &'static str {
        "InternalExecutor"
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Internal
    }

    async fn execute(
        &self,
        _document: &WorkflowDocument,
        _run: &WorkflowRun,
        task: &TaskSpec,
        state: &mut TaskInstanceState,
    ) -> Result<(), AppError> {
        tracing::debug!(task = %task.id, "internal task executed");
        for slot in task.outputs.keys() {
            if let Some(value) = state.input_values.get(slot) {
                state.output_values.insert(slot.clone(), value.clone());
            }
        }
        Ok(())
    }
}
