use indexmap::IndexMap;
use std::collections::BTreeSet;

/// The single workflow document major version this runtime accepts.
pub const SUPPORTED_VERSION: &str = "1.0";
/// File extension the registry scans for when loading a directory.
pub const WORKFLOW_FILE_EXTENSION: &str = "jcwf";

/// Root document for a declarative workflow definition. Immutable after load.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDocument {
    pub version: String,
    pub id: String,
    pub label: String,
    pub doc: String,
    pub triggers: Vec<Trigger>,
    /// Tasks keyed by their map key. The key is the authoritative task id for
    /// graph edges and run state; `TaskSpec::id` is the nominal field from the
    /// document and may differ.
    pub tasks: IndexMap<String, TaskSpec>,
    pub dataflows: Vec<DataflowEdge>,
    /// Opaque `defaults` JSON retained verbatim.
    pub defaults_json: String,
    /// SHA-256 of the document bytes, lowercase hex. Filled by the registry.
    pub content_hash: String,
}

impl WorkflowDocument {
    /// Look up a task by its map key.
    pub fn task(&self, key: &str) -> Option<&TaskSpec> {
        self.tasks.get(key)
    }
}

/// Trigger kind discriminant.
///
/// `Unknown` is the parser's sentinel for an unrecognized `type` string; the
/// validator rejects documents that still carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Immediate,
    Cron,
    FileWatch,
    Structure,
    Manual,
    Unknown,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Immediate => "auto",
            TriggerKind::Cron => "cron",
            TriggerKind::FileWatch => "file_watch",
            TriggerKind::Structure => "structure",
            TriggerKind::Manual => "manual",
            TriggerKind::Unknown => "unknown",
        }
    }
}

/// A trigger declaration. `params_json` is kept as raw JSON and interpreted
/// by the trigger binder per kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub id: String,
    pub enabled: bool,
    pub params_json: String,
}

/// Task executor kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Shell,
    Script,
    RemoteModelCall,
    Internal,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Shell => "shell",
            TaskKind::Script => "python",
            TaskKind::RemoteModelCall => "ai_call",
            TaskKind::Internal => "internal",
        }
    }
}

/// Task scheduling mode. `PerItem` is accepted in the document model but not
/// expanded at runtime; such tasks schedule like `Single`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    Single,
    PerItem,
}

/// Declared input slot: a named channel with a type hint and a required flag.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSlot {
    pub type_hint: String,
    pub required: bool,
}

/// Declared output slot.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSlot {
    pub type_hint: String,
}

/// Execution environment attached to a task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskEnvironment {
    pub name: String,
    pub assistant_id: String,
    /// Variable values keep their raw JSON serialization for non-string
    /// scalars, so numbers and booleans survive as "42" / "true".
    pub variables: IndexMap<String, String>,
}

/// Auxiliary file bindings carried on a task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueBinding {
    pub settings_files: Vec<String>,
    pub task_files: Vec<String>,
    pub context_files: Vec<String>,
}

/// Retry configuration for a task. `max_attempts` below 1 behaves as 1.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 1,
            backoff_ms: 0,
        }
    }
}

/// Task definition consumed by the orchestrator and executors.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub id: String,
    pub kind: TaskKind,
    pub mode: TaskMode,
    pub label: String,
    pub doc: String,
    pub depends_on: BTreeSet<String>,
    pub file_inputs: Vec<String>,
    pub file_outputs: Vec<String>,
    pub inputs: IndexMap<String, InputSlot>,
    pub outputs: IndexMap<String, OutputSlot>,
    pub environment: TaskEnvironment,
    pub queue_binding: QueueBinding,
    /// 0 means no timeout.
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
    /// Opaque params JSON consumed by the executor for this kind.
    pub params_json: String,
}

/// A wire from one task's named output slot to another task's named input slot.
#[derive(Debug, Clone, PartialEq)]
pub struct DataflowEdge {
    pub from_task: String,
    pub from_output: String,
    pub to_task: String,
    pub to_input: String,
    /// Opaque mapping JSON retained verbatim.
    pub mapping_json: String,
}
