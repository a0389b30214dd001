#![allow(clippy::result_large_err)] // Resolver returns AppError naming the task and slot that failed.

//! Per-task input resolution: dataflow edge lookup, run-context fallback,
//! and `${inputs.X}` template expansion.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::document::WorkflowDocument;
use crate::core::workflow::run::WorkflowRun;
use std::collections::BTreeMap;

/// Resolve every declared input slot of `task_key` from predecessor outputs
/// (falling back to the run context for slots with no dataflow edge), then
/// expand `${inputs.X}` references between the resolved values.
pub fn resolve_task_inputs(
    document: &WorkflowDocument,
    run: &WorkflowRun,
    task_key: &str,
) -> Result<BTreeMap<String, String>, AppError> {
    let task = document.task(task_key).ok_or_else(|| {
        AppError::new(
            ErrorCategory::ResolutionError,
            format!("task '{}' is not defined in workflow '{}'", task_key, document.id),
        )
        .with_code("WFL-FLOW-001")
    })?;

    let mut resolved = BTreeMap::new();
    for slot in task.inputs.keys() {
        let edge = document
            .dataflows
            .iter()
            .find(|edge| edge.to_task == task_key && edge.to_input == *slot);
        let value = match edge {
            Some(edge) => {
                let producer = run.task_states.get(&edge.from_task).ok_or_else(|| {
                    missing_input(task_key, slot, &edge.from_task, &edge.from_output)
                })?;
                producer
                    .output_values
                    .get(&edge.from_output)
                    .cloned()
                    .ok_or_else(|| {
                        missing_input(task_key, slot, &edge.from_task, &edge.from_output)
                    })?
            }
            None => match run.context.get(slot) {
                Some(value) => value.clone(),
                None => {
                    return Err(AppError::new(
                        ErrorCategory::ResolutionError,
                        format!(
                            "task '{}' input slot '{}' has no dataflow edge and no context value",
                            task_key, slot
                        ),
                    )
                    .with_code("WFL-FLOW-002"));
                }
            },
        };
        resolved.insert(slot.clone(), value);
    }

    // Second pass: values may reference other resolved slots.
    let snapshot = resolved.clone();
    for (slot, value) in resolved.iter_mut() {
        let location = format!("task '{}' input slot '{}'", task_key, slot);
        *value = expand_input_templates(value, &snapshot, &location)?;
    }
    Ok(resolved)
}

fn missing_input(task_key: &str, slot: &str, from_task: &str, from_output: &str) -> AppError {
    AppError::new(
        ErrorCategory::ResolutionError,
        format!(
            "task '{}' input slot '{}' reads output '{}' of task '{}', which produced no value",
            task_key, slot, from_output, from_task
        ),
    )
    .with_code("WFL-FLOW-003")
}

/// Expand `${inputs.X}` occurrences in `raw` by substituting resolved slot
/// values. Other `${…}` tokens pass through untouched; an unterminated
/// template or a reference to an unknown slot fails.
pub fn expand_input_templates(
    raw: &str,
    resolved: &BTreeMap<String, String>,
    location: &str,
) -> Result<String, AppError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            AppError::new(
                ErrorCategory::ResolutionError,
                format!("{}: unterminated template in '{}'", location, raw),
            )
            .with_code("WFL-FLOW-004")
        })?;
        let token = &after[..end];
        if let Some(slot) = token.strip_prefix("inputs.") {
            let value = resolved.get(slot).ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ResolutionError,
                    format!("{}: template references unknown slot '{}'", location, slot),
                )
                .with_code("WFL-FLOW-005")
            })?;
            out.push_str(value);
        } else {
            out.push_str("${");
            out.push_str(token);
            out.push('}');
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Whether any of the given path templates references a `${inputs.` value,
/// meaning file paths cannot be resolved without running the resolver first.
pub fn templates_reference_inputs(templates: &[String]) -> bool {
    templates
        .iter()
        .any(|template| template.contains("${inputs."))
}
