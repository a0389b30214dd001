use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Run-level execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }
}

/// Per-task execution state within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Skipped,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Ready => "ready",
            TaskState::Running => "running",
            TaskState::Skipped => "skipped",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Skipped | TaskState::Succeeded | TaskState::Failed
        )
    }

    /// State lattice: Pending -> Ready -> Running -> (Succeeded | Failed),
    /// or Pending -> Skipped. No transition out of a terminal state.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        match self {
            TaskState::Pending => matches!(
                next,
                TaskState::Ready | TaskState::Running | TaskState::Skipped | TaskState::Failed
            ),
            TaskState::Ready => matches!(next, TaskState::Running | TaskState::Failed),
            TaskState::Running => matches!(next, TaskState::Succeeded | TaskState::Failed),
            TaskState::Skipped | TaskState::Succeeded | TaskState::Failed => false,
        }
    }
}

/// Ephemeral per-task state, one per task per run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInstanceState {
    pub kind: TaskState,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub input_values: BTreeMap<String, String>,
    pub output_values: BTreeMap<String, String>,
}

impl TaskInstanceState {
    pub fn new() -> Self {
        TaskInstanceState {
            kind: TaskState::Pending,
            attempt_count: 0,
            last_error: None,
            started_at: None,
            completed_at: None,
            input_values: BTreeMap::new(),
            output_values: BTreeMap::new(),
        }
    }
}

impl Default for TaskInstanceState {
    fn default() -> Self {
        Self::new()
    }
}

/// A single execution of a workflow. Ephemeral; owned by the orchestrator,
/// surfaced to callers only as the last-run snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRun {
    pub run_id: String,
    pub workflow_id: String,
    pub workflow_hash: String,
    pub state: RunState,
    /// Run-wide key/value context shared across tasks.
    pub context: BTreeMap<String, String>,
    pub task_states: BTreeMap<String, TaskInstanceState>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn has_failures(&self) -> bool {
        self.task_states
            .values()
            .any(|state| state.kind == TaskState::Failed)
    }

    pub fn all_terminal(&self) -> bool {
        self.task_states.values().all(|state| state.kind.is_terminal())
    }
}
