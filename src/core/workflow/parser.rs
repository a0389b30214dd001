#![allow(clippy::result_large_err)] // Parser returns AppError to carry the document path and field context.

//! JSON document parser: maps a `.jcwf` document onto the workflow model.
//!
//! Contract: missing `version` / `id` / `tasks` or an unsupported version
//! rejects the whole document; unknown fields and unknown enum strings are
//! logged as warnings and parsing continues with safe defaults.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::document::{
    DataflowEdge, InputSlot, OutputSlot, QueueBinding, RetryPolicy, TaskEnvironment, TaskKind,
    TaskMode, TaskSpec, Trigger, TriggerKind, WorkflowDocument, SUPPORTED_VERSION,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const KNOWN_ROOT_FIELDS: &[&str] = &[
    "version", "id", "label", "doc", "triggers", "tasks", "dataflow", "defaults",
];
const KNOWN_TRIGGER_FIELDS: &[&str] = &["type", "id", "enabled", "params"];
const KNOWN_TASK_FIELDS: &[&str] = &[
    "id",
    "type",
    "mode",
    "label",
    "doc",
    "depends_on",
    "file_inputs",
    "file_outputs",
    "environment",
    "queue_binding",
    "inputs",
    "outputs",
    "timeout_ms",
    "retries",
    "params",
];
const KNOWN_DATAFLOW_FIELDS: &[&str] =
    &["from_task", "from_output", "to_task", "to_input", "mapping"];

/// Parse a workflow document from JSON text. `origin` names the source
/// (usually the file path) for diagnostics.
pub fn parse_document(text: &str, origin: &str) -> Result<WorkflowDocument, AppError> {
    let root: Value = serde_json::from_str(text).map_err(|err| {
        AppError::new(
            ErrorCategory::ParseError,
            format!("malformed JSON in {}: {}", origin, err),
        )
        .with_code("WFL-PARSE-003")
    })?;
    let root = root.as_object().ok_or_else(|| {
        AppError::new(
            ErrorCategory::ParseError,
            format!("{}: document root must be an object", origin),
        )
        .with_code("WFL-PARSE-003")
    })?;

    warn_unknown_fields(root, KNOWN_ROOT_FIELDS, origin, "document root");

    let version = require_string(root, "version", origin)?;
    if version != SUPPORTED_VERSION {
        return Err(AppError::new(
            ErrorCategory::ParseError,
            format!(
                "{}: incompatible workflow version '{}', expected '{}'",
                origin, version, SUPPORTED_VERSION
            ),
        )
        .with_code("WFL-PARSE-001"));
    }

    let id = require_string(root, "id", origin)?;
    if id.is_empty() {
        return Err(AppError::new(
            ErrorCategory::ParseError,
            format!("{}: workflow id must be non-empty", origin),
        )
        .with_code("WFL-PARSE-002"));
    }

    let tasks_value = root.get("tasks").ok_or_else(|| {
        missing_field(origin, "tasks")
    })?;
    let tasks_map = tasks_value.as_object().ok_or_else(|| {
        AppError::new(
            ErrorCategory::ParseError,
            format!("{}: 'tasks' must be an object", origin),
        )
        .with_code("WFL-PARSE-003")
    })?;

    let mut tasks = IndexMap::new();
    for (key, value) in tasks_map {
        if key.is_empty() {
            return Err(AppError::new(
                ErrorCategory::ParseError,
                format!("{}: task map keys must be non-empty", origin),
            )
            .with_code("WFL-PARSE-003"));
        }
        let task = parse_task(key, value, origin)?;
        tasks.insert(key.clone(), task);
    }

    let triggers = parse_triggers(root.get("triggers"), origin)?;
    let dataflows = parse_dataflows(root.get("dataflow"), origin)?;

    Ok(WorkflowDocument {
        version,
        id,
        label: optional_string(root, "label"),
        doc: optional_string(root, "doc"),
        triggers,
        tasks,
        dataflows,
        defaults_json: raw_json(root.get("defaults")),
        content_hash: String::new(),
    })
}

fn parse_triggers(value: Option<&Value>, origin: &str) -> Result<Vec<Trigger>, AppError> {
    let items = match value {
        Some(Value::Array(items)) if !items.is_empty() => items,
        Some(Value::Array(_)) | None => {
            // No triggers declared: synthesize a single enabled Immediate one.
            return Ok(vec![Trigger {
                kind: TriggerKind::Immediate,
                id: "auto".to_string(),
                enabled: true,
                params_json: "{}".to_string(),
            }]);
        }
        Some(other) => {
            return Err(AppError::new(
                ErrorCategory::ParseError,
                format!(
                    "{}: 'triggers' must be an array, got {}",
                    origin,
                    json_type_name(other)
                ),
            )
            .with_code("WFL-PARSE-003"));
        }
    };

    let mut triggers = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let obj = item.as_object().ok_or_else(|| {
            AppError::new(
                ErrorCategory::ParseError,
                format!("{}: triggers[{}] must be an object", origin, index),
            )
            .with_code("WFL-PARSE-003")
        })?;
        let context = format!("triggers[{}]", index);
        warn_unknown_fields(obj, KNOWN_TRIGGER_FIELDS, origin, &context);

        let kind_str = optional_string(obj, "type");
        let kind = match kind_str.as_str() {
            "auto" => TriggerKind::Immediate,
            "cron" => TriggerKind::Cron,
            "file_watch" => TriggerKind::FileWatch,
            "structure" => TriggerKind::Structure,
            "manual" => TriggerKind::Manual,
            other => {
                tracing::warn!(
                    origin,
                    trigger_index = index,
                    trigger_type = other,
                    "unknown trigger type, treating as unknown"
                );
                TriggerKind::Unknown
            }
        };

        let id = optional_string(obj, "id");
        if id.is_empty() {
            tracing::warn!(origin, trigger_index = index, "trigger has no id");
        }

        triggers.push(Trigger {
            kind,
            id,
            enabled: obj.get("enabled").and_then(Value::as_bool).unwrap_or(true),
            params_json: raw_json(obj.get("params")),
        });
    }
    Ok(triggers)
}

fn parse_task(key: &str, value: &Value, origin: &str) -> Result<TaskSpec, AppError> {
    let obj = value.as_object().ok_or_else(|| {
        AppError::new(
            ErrorCategory::ParseError,
            format!("{}: task '{}' must be an object", origin, key),
        )
        .with_code("WFL-PARSE-003")
    })?;
    let context = format!("task '{}'", key);
    warn_unknown_fields(obj, KNOWN_TASK_FIELDS, origin, &context);

    // The map key stands in when the task omits its own id.
    let id = match obj.get("id").and_then(Value::as_str) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => key.to_string(),
    };

    let kind_str = optional_string(obj, "type");
    let kind = match kind_str.as_str() {
        "shell" => TaskKind::Shell,
        "python" => TaskKind::Script,
        "ai_call" => TaskKind::RemoteModelCall,
        "internal" | "" => TaskKind::Internal,
        other => {
            tracing::warn!(
                origin,
                task = key,
                task_type = other,
                "unknown task type, defaulting to internal"
            );
            TaskKind::Internal
        }
    };

    let mode_str = optional_string(obj, "mode");
    let mode = match mode_str.as_str() {
        "single" | "" => TaskMode::Single,
        "per_item" => TaskMode::PerItem,
        other => {
            tracing::warn!(
                origin,
                task = key,
                task_mode = other,
                "unknown task mode, defaulting to single"
            );
            TaskMode::Single
        }
    };

    let mut depends_on = BTreeSet::new();
    for dep in string_array(obj.get("depends_on")) {
        depends_on.insert(dep);
    }

    Ok(TaskSpec {
        id,
        kind,
        mode,
        label: optional_string(obj, "label"),
        doc: optional_string(obj, "doc"),
        depends_on,
        file_inputs: string_array(obj.get("file_inputs")),
        file_outputs: string_array(obj.get("file_outputs")),
        inputs: parse_input_slots(obj.get("inputs")),
        outputs: parse_output_slots(obj.get("outputs")),
        environment: parse_environment(obj.get("environment")),
        queue_binding: parse_queue_binding(obj.get("queue_binding")),
        timeout_ms: obj.get("timeout_ms").and_then(Value::as_u64).unwrap_or(0),
        retry: parse_retry(obj.get("retries")),
        params_json: raw_json(obj.get("params")),
    })
}

fn parse_input_slots(value: Option<&Value>) -> IndexMap<String, InputSlot> {
    let mut slots = IndexMap::new();
    if let Some(Value::Object(map)) = value {
        for (name, slot_value) in map {
            slots.insert(
                name.clone(),
                InputSlot {
                    type_hint: slot_value
                        .as_object()
                        .map(|obj| optional_string(obj, "type"))
                        .unwrap_or_default(),
                    required: slot_value
                        .as_object()
                        .and_then(|obj| obj.get("required"))
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                },
            );
        }
    }
    slots
}

fn parse_output_slots(value: Option<&Value>) -> IndexMap<String, OutputSlot> {
    let mut slots = IndexMap::new();
    if let Some(Value::Object(map)) = value {
        for (name, slot_value) in map {
            slots.insert(
                name.clone(),
                OutputSlot {
                    type_hint: slot_value
                        .as_object()
                        .map(|obj| optional_string(obj, "type"))
                        .unwrap_or_default(),
                },
            );
        }
    }
    slots
}

fn parse_environment(value: Option<&Value>) -> TaskEnvironment {
    let obj = match value.and_then(Value::as_object) {
        Some(obj) => obj,
        None => return TaskEnvironment::default(),
    };
    let mut variables = IndexMap::new();
    if let Some(Value::Object(map)) = obj.get("variables") {
        for (name, raw) in map {
            // Strings keep their content; other scalars keep their JSON text
            // so numbers and booleans survive the round-trip.
            let rendered = match raw {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            variables.insert(name.clone(), rendered);
        }
    }
    TaskEnvironment {
        name: optional_string(obj, "name"),
        assistant_id: optional_string(obj, "assistant_id"),
        variables,
    }
}

fn parse_queue_binding(value: Option<&Value>) -> QueueBinding {
    let obj = match value.and_then(Value::as_object) {
        Some(obj) => obj,
        None => return QueueBinding::default(),
    };
    QueueBinding {
        settings_files: string_array(obj.get("stng_files")),
        task_files: string_array(obj.get("task_files")),
        context_files: string_array(obj.get("cnxt_files")),
    }
}

fn parse_retry(value: Option<&Value>) -> RetryPolicy {
    let obj = match value.and_then(Value::as_object) {
        Some(obj) => obj,
        None => return RetryPolicy::default(),
    };
    RetryPolicy {
        max_attempts: obj
            .get("max_attempts")
            .and_then(Value::as_u64)
            .map(|value| value.min(u32::MAX as u64) as u32)
            .unwrap_or(1),
        backoff_ms: obj.get("backoff_ms").and_then(Value::as_u64).unwrap_or(0),
    }
}

fn parse_dataflows(value: Option<&Value>, origin: &str) -> Result<Vec<DataflowEdge>, AppError> {
    let items = match value {
        Some(Value::Array(items)) => items,
        None => return Ok(Vec::new()),
        Some(other) => {
            return Err(AppError::new(
                ErrorCategory::ParseError,
                format!(
                    "{}: 'dataflow' must be an array, got {}",
                    origin,
                    json_type_name(other)
                ),
            )
            .with_code("WFL-PARSE-003"));
        }
    };
    let mut edges = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let obj = item.as_object().ok_or_else(|| {
            AppError::new(
                ErrorCategory::ParseError,
                format!("{}: dataflow[{}] must be an object", origin, index),
            )
            .with_code("WFL-PARSE-003")
        })?;
        let context = format!("dataflow[{}]", index);
        warn_unknown_fields(obj, KNOWN_DATAFLOW_FIELDS, origin, &context);
        edges.push(DataflowEdge {
            from_task: optional_string(obj, "from_task"),
            from_output: optional_string(obj, "from_output"),
            to_task: optional_string(obj, "to_task"),
            to_input: optional_string(obj, "to_input"),
            mapping_json: raw_json(obj.get("mapping")),
        });
    }
    Ok(edges)
}

fn require_string(obj: &Map<String, Value>, field: &str, origin: &str) -> Result<String, AppError> {
    match obj.get(field) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(AppError::new(
            ErrorCategory::ParseError,
            format!(
                "{}: '{}' must be a string, got {}",
                origin,
                field,
                json_type_name(other)
            ),
        )
        .with_code("WFL-PARSE-003")),
        None => Err(missing_field(origin, field)),
    }
}

fn missing_field(origin: &str, field: &str) -> AppError {
    AppError::new(
        ErrorCategory::ParseError,
        format!("{}: missing required field '{}'", origin, field),
    )
    .with_code("WFL-PARSE-002")
}

fn optional_string(obj: &Map<String, Value>, field: &str) -> String {
    obj.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Retain a field as its raw JSON serialization; absent fields become "{}".
fn raw_json(value: Option<&Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "{}".to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn warn_unknown_fields(
    obj: &Map<String, Value>,
    known: &[&str],
    origin: &str,
    context: &str,
) {
    for field in obj.keys() {
        if !known.contains(&field.as_str()) {
            tracing::warn!(origin, context, field = %field, "ignoring unknown field");
        }
    }
}
