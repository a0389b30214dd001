//! Make-style up-to-date decision over a task's declared files.
//!
//! A task is up to date when every declared output is at least as new as the
//! newest declared input or transitive upstream output. Missing or unreadable
//! files are never an error here; they simply force a rebuild.

use crate::core::workflow::document::WorkflowDocument;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Resolves the output paths of another task, or None when they cannot be
/// determined.
pub type UpstreamOutputResolver<'a> = dyn Fn(&str) -> Option<Vec<PathBuf>> + 'a;

/// Decide whether the task identified by `task_key` may be skipped.
///
/// `input_paths` / `output_paths` are the task's already-resolved file lists;
/// `upstream_outputs` resolves the output paths of any other task. Transitive
/// predecessors are walked through `depends_on` with a visited set, so
/// diamond shapes and (defensively) cycles terminate.
pub fn is_up_to_date(
    document: &WorkflowDocument,
    task_key: &str,
    input_paths: &[PathBuf],
    output_paths: &[PathBuf],
    upstream_outputs: &UpstreamOutputResolver<'_>,
) -> bool {
    // A task with no declared outputs always runs.
    if output_paths.is_empty() {
        return false;
    }

    let mut newest_source: Option<SystemTime> = None;
    for path in input_paths {
        match modified_time(path) {
            Some(time) => track_newest(&mut newest_source, time),
            None => {
                tracing::debug!(task = task_key, path = %path.display(), "input missing, not up to date");
                return false;
            }
        }
    }

    // Walk transitive predecessors and fold in their output times.
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = match document.task(task_key) {
        Some(task) => task.depends_on.iter().map(String::as_str).collect(),
        None => return false,
    };
    while let Some(predecessor) = stack.pop() {
        if !visited.insert(predecessor) {
            continue;
        }
        let outputs = match upstream_outputs(predecessor) {
            Some(outputs) => outputs,
            None => {
                tracing::debug!(
                    task = task_key,
                    upstream = predecessor,
                    "upstream outputs unresolvable, not up to date"
                );
                return false;
            }
        };
        for path in &outputs {
            match modified_time(path) {
                Some(time) => track_newest(&mut newest_source, time),
                None => {
                    tracing::debug!(
                        task = task_key,
                        upstream = predecessor,
                        path = %path.display(),
                        "upstream output missing, not up to date"
                    );
                    return false;
                }
            }
        }
        if let Some(task) = document.task(predecessor) {
            stack.extend(task.depends_on.iter().map(String::as_str));
        }
    }

    let mut oldest_output: Option<SystemTime> = None;
    for path in output_paths {
        match modified_time(path) {
            Some(time) => {
                if oldest_output.map(|oldest| time < oldest).unwrap_or(true) {
                    oldest_output = Some(time);
                }
            }
            None => {
                tracing::debug!(task = task_key, path = %path.display(), "output missing, not up to date");
                return false;
            }
        }
    }

    match (oldest_output, newest_source) {
        // "Equal" counts as up to date: two files written in the same
        // filesystem tick compare as current.
        (Some(oldest), Some(newest)) => oldest >= newest,
        // Outputs exist and nothing feeds this task.
        (Some(_), None) => true,
        (None, _) => false,
    }
}

fn track_newest(newest: &mut Option<SystemTime>, time: SystemTime) {
    if newest.map(|current| time > current).unwrap_or(true) {
        *newest = Some(time);
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok().and_then(|meta| meta.modified().ok())
}
