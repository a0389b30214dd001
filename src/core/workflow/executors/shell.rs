#![allow(clippy::result_large_err)] // Shell executor returns AppError to surface subprocess diagnostics.

//! Shell executor: expands command-line templates, enforces path and
//! argument safety, spawns the external command, and maps the exit code to a
//! task outcome.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::dataflow::expand_input_templates;
use crate::core::workflow::document::{TaskKind, TaskSpec, WorkflowDocument};
use crate::core::workflow::executor::TaskExecutor;
use crate::core::workflow::run::{TaskInstanceState, WorkflowRun};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// Commands must live under this prefix; anything else is rejected before
/// touching the filesystem.
const SCRIPT_PREFIX: &str = "scripts/";
/// Characters that would change shell semantics if they survived expansion.
const FORBIDDEN_ARG_CHARS: &[char] = &[';', '&', '|', '>', '<', '\'', '"', '`'];
const STDERR_SNIPPET_LIMIT: usize = 512;

pub struct ShellExecutor {
    runner: Arc<dyn CommandRunner>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        ShellExecutor {
            runner: Arc::new(TokioCommandRunner),
        }
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        ShellExecutor { runner }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskExecutor for ShellExecutor {
    fn name(&self) -> &'static str {
        "ShellExecutor"
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Shell
    }

    async fn execute(
        &self,
        _document: &WorkflowDocument,
        _run: &WorkflowRun,
        task: &TaskSpec,
        state: &mut TaskInstanceState,
    ) -> Result<(), AppError> {
        let params = ShellParams::from_json(&task.params_json)?;

        if !params.command.starts_with(SCRIPT_PREFIX) {
            return Err(AppError::new(
                ErrorCategory::ExecutorError,
                format!(
                    "shell command '{}' must start with '{}'",
                    params.command, SCRIPT_PREFIX
                ),
            )
            .with_code("WFL-SHELL-001"));
        }

        // Resolve `${inputs.X}` placeholders inside the declared file lists
        // so the macros below expand to concrete paths.
        let file_inputs = resolve_file_list(&task.file_inputs, state, &task.id)?;
        let file_outputs = resolve_file_list(&task.file_outputs, state, &task.id)?;

        let output_slots = map_output_slots(task, state, &file_outputs);

        let mut args = params.args.clone();
        let mentions_inputs = args
            .iter()
            .any(|arg| arg.contains("${inputs}") || arg.contains("${input["));
        if !mentions_inputs {
            args.insert(0, "${inputs}".to_string());
        }
        let mentions_outputs = args
            .iter()
            .any(|arg| arg.contains("${outputs}") || arg.contains("${output["));
        if !mentions_outputs {
            args.push("${outputs}".to_string());
        }

        let mut expanded = Vec::with_capacity(args.len());
        for arg in &args {
            let value = expand_argument(arg, &file_inputs, &file_outputs, state, task)?;
            check_argument_safety(&value)?;
            expanded.push(value);
        }

        let mut command_line = params.command.clone();
        for arg in &expanded {
            if !arg.is_empty() {
                command_line.push(' ');
                command_line.push_str(arg);
            }
        }

        tracing::debug!(task = %task.id, command = %command_line, "executing shell command");

        let env: HashMap<String, String> = task
            .environment
            .variables
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let output = self
            .runner
            .run(&CommandRequest { command_line, env })
            .await?;

        if output.exit_code != 0 {
            let stderr = stderr_snippet(&output.stderr);
            return Err(AppError::new(
                ErrorCategory::ExecutorError,
                format!(
                    "command '{}' exited with code {}{}",
                    params.command, output.exit_code, stderr
                ),
            )
            .with_code("WFL-SHELL-002"));
        }

        for (slot, path) in output_slots {
            state.output_values.insert(slot, path);
        }
        Ok(())
    }
}

/// Map declared output slot names to concrete path strings: zip slots with
/// file outputs when the counts match, then fill any remaining slot from a
/// same-named resolved input value.
fn map_output_slots(
    task: &TaskSpec,
    state: &TaskInstanceState,
    file_outputs: &[String],
) -> IndexMap<String, String> {
    let mut slots = IndexMap::new();
    if task.outputs.len() == file_outputs.len() {
        for (slot, path) in task.outputs.keys().zip(file_outputs) {
            slots.insert(slot.clone(), path.clone());
        }
    }
    for slot in task.outputs.keys() {
        if !slots.contains_key(slot) {
            if let Some(value) = state.input_values.get(slot) {
                slots.insert(slot.clone(), value.clone());
            }
        }
    }
    slots
}

fn resolve_file_list(
    templates: &[String],
    state: &TaskInstanceState,
    task_id: &str,
) -> Result<Vec<String>, AppError> {
    let location = format!("task '{}' file list", task_id);
    templates
        .iter()
        .map(|template| expand_input_templates(template, &state.input_values, &location))
        .collect()
}

/// Expand one argument. Recognized templates:
/// `${inputs}`, `${outputs}`, `${input[N]}`, `${output[N]}`, `${slot.NAME}`,
/// `${env.NAME}`. Anything else inside `${…}`, or an unterminated template,
/// fails the task.
fn expand_argument(
    raw: &str,
    file_inputs: &[String],
    file_outputs: &[String],
    state: &TaskInstanceState,
    task: &TaskSpec,
) -> Result<String, AppError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            AppError::new(
                ErrorCategory::ExecutorError,
                format!("unterminated template in argument '{}'", raw),
            )
            .with_code("WFL-SHELL-003")
        })?;
        let token = &after[..end];
        let replacement = expand_token(token, file_inputs, file_outputs, state, task)?;
        out.push_str(&replacement);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn expand_token(
    token: &str,
    file_inputs: &[String],
    file_outputs: &[String],
    state: &TaskInstanceState,
    task: &TaskSpec,
) -> Result<String, AppError> {
    match token {
        "inputs" => Ok(file_inputs.join(" ")),
        "outputs" => Ok(file_outputs.join(" ")),
        _ => {
            if let Some(index) = parse_indexed(token, "input[") {
                return indexed_path(file_inputs, index?, "input");
            }
            if let Some(index) = parse_indexed(token, "output[") {
                return indexed_path(file_outputs, index?, "output");
            }
            if let Some(slot) = token.strip_prefix("slot.") {
                return state.input_values.get(slot).cloned().ok_or_else(|| {
                    AppError::new(
                        ErrorCategory::ExecutorError,
                        format!("argument references unresolved slot '{}'", slot),
                    )
                    .with_code("WFL-SHELL-004")
                });
            }
            if let Some(name) = token.strip_prefix("env.") {
                // Absent environment variables expand to the empty string.
                return Ok(task
                    .environment
                    .variables
                    .get(name)
                    .cloned()
                    .unwrap_or_default());
            }
            Err(AppError::new(
                ErrorCategory::ExecutorError,
                format!("unrecognized template '${{{}}}'", token),
            )
            .with_code("WFL-SHELL-005"))
        }
    }
}

type IndexParse = Result<usize, AppError>;

fn parse_indexed(token: &str, prefix: &str) -> Option<IndexParse> {
    let body = token.strip_prefix(prefix)?;
    let digits = body.strip_suffix(']')?;
    Some(digits.parse::<usize>().map_err(|_| {
        AppError::new(
            ErrorCategory::ExecutorError,
            format!("invalid index in template '${{{}}}'", token),
        )
        .with_code("WFL-SHELL-005")
    }))
}

fn indexed_path(paths: &[String], index: usize, which: &str) -> Result<String, AppError> {
    paths.get(index).cloned().ok_or_else(|| {
        AppError::new(
            ErrorCategory::ExecutorError,
            format!(
                "{} index {} out of range, task declares {} file {}s",
                which,
                index,
                paths.len(),
                which
            ),
        )
        .with_code("WFL-SHELL-006")
    })
}

fn check_argument_safety(arg: &str) -> Result<(), AppError> {
    let offending = arg
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_ARG_CHARS.contains(c));
    if let Some(c) = offending {
        return Err(AppError::new(
            ErrorCategory::ExecutorError,
            format!(
                "argument '{}' contains unsupported characters ('{}')",
                arg,
                c.escape_default()
            ),
        )
        .with_code("WFL-SHELL-007"));
    }
    Ok(())
}

fn stderr_snippet(stderr: &[u8]) -> String {
    if stderr.is_empty() {
        return String::new();
    }
    let limit = STDERR_SNIPPET_LIMIT.min(stderr.len());
    format!(
        ": {}",
        String::from_utf8_lossy(&stderr[..limit]).trim_end()
    )
}

struct ShellParams {
    command: String,
    args: Vec<String>,
}

impl ShellParams {
    fn from_json(params_json: &str) -> Result<Self, AppError> {
        let value: Value = serde_json::from_str(params_json).map_err(|err| {
            AppError::new(
                ErrorCategory::ExecutorError,
                format!("shell params are not valid JSON: {}", err),
            )
            .with_code("WFL-SHELL-008")
        })?;
        let map = value.as_object().ok_or_else(|| {
            AppError::new(
                ErrorCategory::ExecutorError,
                "shell params must be an object",
            )
            .with_code("WFL-SHELL-008")
        })?;
        let command = map
            .get("command")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ExecutorError,
                    "shell params require a non-empty 'command' string",
                )
                .with_code("WFL-SHELL-008")
            })?
            .to_string();
        let args = match map.get("args") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        AppError::new(
                            ErrorCategory::ExecutorError,
                            "shell params 'args' must be an array of strings",
                        )
                        .with_code("WFL-SHELL-008")
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
            Some(_) => {
                return Err(AppError::new(
                    ErrorCategory::ExecutorError,
                    "shell params 'args' must be an array of strings",
                )
                .with_code("WFL-SHELL-008"));
            }
        };
        Ok(ShellParams { command, args })
    }
}

/// Request handed to the command runner: a whitespace-joined command line
/// and extra environment variables layered over the inherited environment.
#[derive(Clone, Debug)]
pub struct CommandRequest {
    pub command_line: String,
    pub env: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, AppError>;
}

struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, AppError> {
        let mut parts = request.command_line.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            AppError::new(ErrorCategory::ExecutorError, "command line is empty")
                .with_code("WFL-SHELL-008")
        })?;
        let mut command = Command::new(program);
        for arg in parts {
            command.arg(arg);
        }
        command.envs(&request.env);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let output = command.output().await.map_err(|err| {
            AppError::new(
                ErrorCategory::ExecutorError,
                format!("failed to spawn '{}': {}", program, err),
            )
            .with_code("WFL-SHELL-009")
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
