#![allow(clippy::result_large_err)] // Binder returns AppError so per-trigger failures carry param context.

//! Translates parsed trigger declarations into concrete registrations on the
//! trigger engine. A trigger with bad params is logged and skipped; the rest
//! of the workflow's triggers still register.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::cron::CronSchedule;
use crate::core::workflow::document::{Trigger, TriggerKind};
use crate::core::workflow::registry::WorkflowRegistry;
use crate::core::workflow::trigger::{FileEventKind, TriggerEngine};
use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Register every trigger of every workflow in the registry. Returns the
/// number of successful registrations (immediate triggers included).
pub fn bind_registry_triggers(
    registry: &WorkflowRegistry,
    engine: &mut TriggerEngine,
    now: DateTime<Local>,
) -> usize {
    let mut bound = 0;
    for workflow_id in registry.get_workflow_ids() {
        let document = match registry.get_workflow(&workflow_id) {
            Some(document) => document,
            None => continue,
        };
        for trigger in &document.triggers {
            match bind_trigger(&workflow_id, trigger, engine, now) {
                Ok(true) => bound += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(
                        workflow = %workflow_id,
                        trigger = %trigger.id,
                        kind = trigger.kind.as_str(),
                        "trigger not registered: {}",
                        err
                    );
                }
            }
        }
    }
    bound
}

/// Bind a single trigger. Ok(false) means intentionally skipped.
pub fn bind_trigger(
    workflow_id: &str,
    trigger: &Trigger,
    engine: &mut TriggerEngine,
    now: DateTime<Local>,
) -> Result<bool, AppError> {
    match trigger.kind {
        TriggerKind::Immediate => {
            engine.add_immediate_trigger(workflow_id, &trigger.id, trigger.enabled);
            Ok(true)
        }
        TriggerKind::Cron => {
            let params = parse_params(&trigger.params_json)?;
            let expression = require_param_str(&params, "expression")?;
            if let Some(timezone) = params.get("timezone").and_then(Value::as_str) {
                tracing::debug!(
                    workflow = workflow_id,
                    trigger = %trigger.id,
                    timezone,
                    "cron timezone param is advisory, using local time"
                );
            }
            // A malformed expression registers disabled rather than erroring
            // out: the trigger exists but never fires.
            let schedule = match CronSchedule::parse(&expression) {
                Ok(schedule) => Some(schedule),
                Err(err) => {
                    tracing::error!(
                        workflow = workflow_id,
                        trigger = %trigger.id,
                        expression = %expression,
                        "invalid cron expression, trigger disabled: {}",
                        err
                    );
                    None
                }
            };
            engine.add_cron_trigger(workflow_id, &trigger.id, trigger.enabled, schedule, now);
            Ok(true)
        }
        TriggerKind::FileWatch => {
            let params = parse_params(&trigger.params_json)?;
            let path = require_param_str(&params, "path")?;
            let events = parse_events(&params)?;
            let debounce_ms = params
                .get("debounce_ms")
                .and_then(Value::as_i64)
                .unwrap_or(0)
                .clamp(0, u32::MAX as i64) as u32;
            engine.add_file_watch_trigger(
                workflow_id,
                &trigger.id,
                trigger.enabled,
                &path,
                events,
                debounce_ms,
            );
            Ok(true)
        }
        TriggerKind::Manual => {
            engine.add_manual_trigger(workflow_id, &trigger.id, trigger.enabled);
            Ok(true)
        }
        TriggerKind::Structure => {
            tracing::info!(
                workflow = workflow_id,
                trigger = %trigger.id,
                "structure triggers are not expanded at runtime, skipping"
            );
            Ok(false)
        }
        TriggerKind::Unknown => Err(AppError::new(
            ErrorCategory::TriggerParamError,
            "trigger has unknown kind",
        )
        .with_code("WFL-TRIG-001")),
    }
}

fn parse_params(params_json: &str) -> Result<Map<String, Value>, AppError> {
    match serde_json::from_str::<Value>(params_json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AppError::new(
            ErrorCategory::TriggerParamError,
            format!("trigger params must be an object, got {}", other),
        )
        .with_code("WFL-TRIG-002")),
        Err(err) => Err(AppError::new(
            ErrorCategory::TriggerParamError,
            format!("trigger params are not valid JSON: {}", err),
        )
        .with_code("WFL-TRIG-002")),
    }
}

fn require_param_str(params: &Map<String, Value>, field: &str) -> Result<String, AppError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::new(
                ErrorCategory::TriggerParamError,
                format!("trigger params require a non-empty '{}' string", field),
            )
            .with_code("WFL-TRIG-003")
        })
}

fn parse_events(params: &Map<String, Value>) -> Result<HashSet<FileEventKind>, AppError> {
    let items = params.get("events").and_then(Value::as_array).ok_or_else(|| {
        AppError::new(
            ErrorCategory::TriggerParamError,
            "file-watch trigger params require an 'events' array",
        )
        .with_code("WFL-TRIG-003")
    })?;
    let mut events = HashSet::new();
    for item in items {
        match item.as_str().and_then(FileEventKind::parse) {
            Some(event) => {
                events.insert(event);
            }
            None => {
                tracing::warn!(event = %item, "ignoring unknown file event kind");
            }
        }
    }
    if events.is_empty() {
        return Err(AppError::new(
            ErrorCategory::TriggerParamError,
            "file-watch trigger has no recognized events",
        )
        .with_code("WFL-TRIG-003"));
    }
    Ok(events)
}
