#![allow(clippy::result_large_err)] // Orchestrator returns AppError to preserve run-level diagnostic context.

//! Scheduling core: wave-based ready-task selection, freshness-driven skips,
//! concurrent dispatch through the executor registry, and per-run state
//! accounting.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::dataflow::{
    expand_input_templates, resolve_task_inputs, templates_reference_inputs,
};
use crate::core::workflow::document::{TaskSpec, WorkflowDocument};
use crate::core::workflow::executor::ExecutorRegistry;
use crate::core::workflow::freshness;
use crate::core::workflow::registry::WorkflowRegistry;
use crate::core::workflow::run::{RunState, TaskInstanceState, TaskState, WorkflowRun};
use crate::core::workflow::validate;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Owns run execution. The registry is read-only shared state; runs are
/// created per trigger firing and surfaced only as last-run snapshots.
pub struct Orchestrator {
    registry: Arc<WorkflowRegistry>,
    executors: ExecutorRegistry,
    last_runs: DashMap<String, WorkflowRun>,
}

struct TaskOutcome {
    key: String,
    state: TaskInstanceState,
}

impl Orchestrator {
    pub fn new(registry: Arc<WorkflowRegistry>, executors: ExecutorRegistry) -> Self {
        Orchestrator {
            registry,
            executors,
            last_runs: DashMap::new(),
        }
    }

    /// Snapshot of the most recent run for a workflow, if any.
    pub fn last_run(&self, workflow_id: &str) -> Option<WorkflowRun> {
        self.last_runs
            .get(workflow_id)
            .map(|entry| entry.value().clone())
    }

    /// Execute one full run of the named workflow and return its final state.
    pub async fn run_workflow_once(
        &self,
        workflow_id: &str,
        run_id: Option<String>,
    ) -> Result<WorkflowRun, AppError> {
        let document = self.registry.get_workflow(workflow_id).ok_or_else(|| {
            AppError::new(
                ErrorCategory::SchedulingError,
                format!("unknown workflow '{}'", workflow_id),
            )
            .with_code("WFL-ORCH-001")
        })?;

        let issues = validate::validate_document(document);
        if !issues.is_empty() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "refusing to run invalid workflow '{}' ({} validation issues, first: {})",
                    workflow_id,
                    issues.len(),
                    issues[0].message
                ),
            )
            .with_code("WFL-ORCH-002"));
        }

        let run_id = run_id.unwrap_or_else(|| {
            format!("{}-{}", workflow_id, Utc::now().format("%Y%m%dT%H%M%S%3f"))
        });
        let mut run = WorkflowRun {
            run_id,
            workflow_id: workflow_id.to_string(),
            workflow_hash: document.content_hash.clone(),
            state: RunState::Running,
            context: BTreeMap::new(),
            task_states: document
                .tasks
                .keys()
                .map(|key| (key.clone(), TaskInstanceState::new()))
                .collect(),
            started_at: Utc::now(),
            completed_at: None,
        };
        tracing::info!(workflow = workflow_id, run = %run.run_id, "run started");

        let mut stalled = false;
        loop {
            let (ready, progress) = self.collect_wave(document, &mut run);

            if ready.is_empty() {
                if run.all_terminal() {
                    break;
                }
                if !progress {
                    if run.has_failures() {
                        tracing::warn!(
                            workflow = workflow_id,
                            run = %run.run_id,
                            "remaining tasks are blocked by failed dependencies"
                        );
                    } else {
                        tracing::error!(
                            workflow = workflow_id,
                            run = %run.run_id,
                            "no progress with non-terminal tasks remaining, aborting run"
                        );
                    }
                    stalled = true;
                    break;
                }
                continue;
            }

            for key in &ready {
                if let Some(state) = run.task_states.get_mut(key) {
                    state.kind = TaskState::Running;
                }
            }
            let futures: Vec<_> = ready
                .iter()
                .map(|key| self.execute_task_instance(document, &run, key))
                .collect();
            let outcomes = join_all(futures).await;
            for outcome in outcomes {
                run.task_states.insert(outcome.key.clone(), outcome.state);
            }
        }

        run.state = if stalled || run.has_failures() {
            RunState::Failed
        } else {
            RunState::Succeeded
        };
        run.completed_at = Some(Utc::now());
        tracing::info!(
            workflow = workflow_id,
            run = %run.run_id,
            state = run.state.as_str(),
            "run finished"
        );

        self.last_runs
            .insert(workflow_id.to_string(), run.clone());
        Ok(run)
    }

    /// One pass over the run's task states: skip tasks that are up to date,
    /// collect the wave of ready tasks. Returns (ready keys, whether any
    /// state changed during collection).
    fn collect_wave(
        &self,
        document: &WorkflowDocument,
        run: &mut WorkflowRun,
    ) -> (Vec<String>, bool) {
        let keys: Vec<String> = run.task_states.keys().cloned().collect();
        let mut ready = Vec::new();
        let mut progress = false;

        for key in keys {
            let current = match run.task_states.get(&key) {
                Some(state) => state.kind,
                None => continue,
            };
            if !matches!(current, TaskState::Pending | TaskState::Ready) {
                continue;
            }

            let task = match document.task(&key) {
                Some(task) => task,
                None => {
                    // States are built from the task map, so this only fires
                    // if the document was mutated out from under the run.
                    if let Some(state) = run.task_states.get_mut(&key) {
                        state.kind = TaskState::Failed;
                        state.last_error =
                            Some(format!("task '{}' has no definition", key));
                        state.completed_at = Some(Utc::now());
                    }
                    progress = true;
                    continue;
                }
            };

            let blocked = task.depends_on.iter().any(|dep| {
                run.task_states
                    .get(dep)
                    .map(|state| {
                        !matches!(state.kind, TaskState::Succeeded | TaskState::Skipped)
                    })
                    .unwrap_or(true)
            });
            if blocked {
                continue;
            }

            if let Some(resolved_outputs) = self.try_skip_fresh(document, run, &key, task) {
                let state = run
                    .task_states
                    .entry(key.clone())
                    .or_insert_with(TaskInstanceState::new);
                state.kind = TaskState::Skipped;
                state.completed_at = Some(Utc::now());
                state.output_values = map_skipped_outputs(task, &resolved_outputs);
                tracing::debug!(task = %key, "up to date, skipped");
                progress = true;
                continue;
            }

            if let Some(state) = run.task_states.get_mut(&key) {
                state.kind = TaskState::Ready;
            }
            ready.push(key);
        }
        (ready, progress)
    }

    /// Freshness evaluation. Returns the resolved output paths when the task
    /// is up to date, None when it must run. Resolution trouble is never an
    /// error here; it just means "not up to date" and the real failure
    /// surfaces at dispatch.
    fn try_skip_fresh(
        &self,
        document: &WorkflowDocument,
        run: &WorkflowRun,
        key: &str,
        task: &TaskSpec,
    ) -> Option<Vec<String>> {
        let resolved_inputs = if templates_reference_inputs(&task.file_inputs)
            || templates_reference_inputs(&task.file_outputs)
        {
            match resolve_task_inputs(document, run, key) {
                Ok(values) => values,
                Err(err) => {
                    tracing::debug!(task = key, "freshness resolution deferred: {}", err);
                    return None;
                }
            }
        } else {
            BTreeMap::new()
        };

        let input_paths = resolve_paths(&task.file_inputs, &resolved_inputs, key)?;
        let output_paths = resolve_paths(&task.file_outputs, &resolved_inputs, key)?;

        let resolver = |other: &str| -> Option<Vec<PathBuf>> {
            let other_task = document.task(other)?;
            let values = if templates_reference_inputs(&other_task.file_outputs) {
                resolve_task_inputs(document, run, other).ok()?
            } else {
                BTreeMap::new()
            };
            let paths = resolve_paths(&other_task.file_outputs, &values, other)?;
            Some(paths.iter().map(PathBuf::from).collect())
        };

        let input_path_bufs: Vec<PathBuf> = input_paths.iter().map(PathBuf::from).collect();
        let output_path_bufs: Vec<PathBuf> = output_paths.iter().map(PathBuf::from).collect();
        if freshness::is_up_to_date(document, key, &input_path_bufs, &output_path_bufs, &resolver)
        {
            Some(output_paths)
        } else {
            None
        }
    }

    /// Run a single task: resolve inputs, dispatch to the registered
    /// executor with the retry policy and per-attempt timeout, and return
    /// the final instance state.
    async fn execute_task_instance(
        &self,
        document: &WorkflowDocument,
        run: &WorkflowRun,
        key: &str,
    ) -> TaskOutcome {
        let mut state = run
            .task_states
            .get(key)
            .cloned()
            .unwrap_or_else(TaskInstanceState::new);
        state.kind = TaskState::Running;
        state.started_at = Some(Utc::now());

        let task = match document.task(key) {
            Some(task) => task,
            None => {
                return fail_outcome(key, state, format!("task '{}' has no definition", key));
            }
        };

        // Resolution keys off the task's map key, not its nominal id field.
        match resolve_task_inputs(document, run, key) {
            Ok(values) => state.input_values = values,
            Err(err) => {
                tracing::error!(task = key, "input resolution failed: {}", err);
                return fail_outcome(key, state, err.to_string());
            }
        }

        let executor = match self.executors.get(task.kind) {
            Some(executor) => executor,
            None => {
                return fail_outcome(
                    key,
                    state,
                    format!("no executor registered for kind '{}'", task.kind.as_str()),
                );
            }
        };

        let max_attempts = task.retry.max_attempts.max(1);
        loop {
            state.attempt_count += 1;
            let attempt = state.attempt_count;

            let result = {
                let execution = executor.execute(document, run, task, &mut state);
                if task.timeout_ms > 0 {
                    match timeout(Duration::from_millis(task.timeout_ms), execution).await {
                        Ok(result) => result,
                        Err(_) => Err(AppError::new(
                            ErrorCategory::TimeoutError,
                            format!("task '{}' timed out after {} ms", key, task.timeout_ms),
                        )
                        .with_code("WFL-ORCH-004")),
                    }
                } else {
                    execution.await
                }
            };

            match result {
                Ok(()) => {
                    if state.kind == TaskState::Running {
                        state.kind = TaskState::Succeeded;
                    }
                    state.completed_at = Some(Utc::now());
                    tracing::debug!(
                        task = key,
                        executor = executor.name(),
                        state = state.kind.as_str(),
                        attempts = attempt,
                        "task finished"
                    );
                    return TaskOutcome {
                        key: key.to_string(),
                        state,
                    };
                }
                Err(err) => {
                    if attempt >= max_attempts {
                        tracing::error!(task = key, attempts = attempt, "task failed: {}", err);
                        return fail_outcome(key, state, err.to_string());
                    }
                    let backoff_ms = task.retry.backoff_ms.saturating_mul(attempt as u64);
                    tracing::warn!(
                        task = key,
                        attempt,
                        backoff_ms,
                        "task attempt failed, retrying: {}",
                        err
                    );
                    if backoff_ms > 0 {
                        sleep(Duration::from_millis(backoff_ms)).await;
                    }
                }
            }
        }
    }
}

fn fail_outcome(key: &str, mut state: TaskInstanceState, message: String) -> TaskOutcome {
    state.kind = TaskState::Failed;
    state.last_error = Some(message);
    state.completed_at = Some(Utc::now());
    TaskOutcome {
        key: key.to_string(),
        state,
    }
}

fn resolve_paths(
    templates: &[String],
    resolved_inputs: &BTreeMap<String, String>,
    task_key: &str,
) -> Option<Vec<String>> {
    let location = format!("task '{}' file list", task_key);
    templates
        .iter()
        .map(|template| expand_input_templates(template, resolved_inputs, &location).ok())
        .collect()
}

/// Output-slot mapping for skipped tasks: zip sorted slot names with the
/// resolved output paths when counts match, broadcast a single path to every
/// slot, give a lone slot the first path, and leave the map empty when the
/// shape is ambiguous.
fn map_skipped_outputs(task: &TaskSpec, resolved_outputs: &[String]) -> BTreeMap<String, String> {
    let mut slots: Vec<&String> = task.outputs.keys().collect();
    slots.sort();

    let mut map = BTreeMap::new();
    if slots.len() == resolved_outputs.len() {
        for (slot, path) in slots.into_iter().zip(resolved_outputs) {
            map.insert(slot.clone(), path.clone());
        }
    } else if resolved_outputs.len() == 1 {
        for slot in slots {
            map.insert(slot.clone(), resolved_outputs[0].clone());
        }
    } else if slots.len() == 1 && !resolved_outputs.is_empty() {
        map.insert(slots[0].clone(), resolved_outputs[0].clone());
    }
    map
}
