//! Cross-reference validation over a parsed workflow document.
//!
//! A failing check contributes to an overall-invalid verdict but does not
//! remove the workflow from its registry; callers refuse to run invalid
//! workflows.

use crate::core::workflow::document::{TriggerKind, WorkflowDocument};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// A single validation finding.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub code: &'static str,
    pub message: String,
    pub task_id: Option<String>,
}

impl ValidationIssue {
    fn new(code: &'static str, message: String, task_id: Option<String>) -> Self {
        ValidationIssue {
            code,
            message,
            task_id,
        }
    }
}

/// Run every check over the document. An empty result means valid.
pub fn validate_document(document: &WorkflowDocument) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    check_triggers(document, &mut issues);
    check_dependencies(document, &mut issues);
    check_slots(document, &mut issues);
    check_dataflows(document, &mut issues);
    check_cycles(document, &mut issues);
    for issue in &issues {
        tracing::error!(
            workflow = %document.id,
            code = issue.code,
            task = issue.task_id.as_deref().unwrap_or("-"),
            "{}",
            issue.message
        );
    }
    issues
}

/// Convenience predicate over `validate_document`.
pub fn is_valid(document: &WorkflowDocument) -> bool {
    validate_document(document).is_empty()
}

fn check_triggers(document: &WorkflowDocument, issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for trigger in &document.triggers {
        if !seen.insert(trigger.id.clone()) {
            issues.push(ValidationIssue::new(
                "WFL-VAL-001",
                format!("duplicate trigger id '{}'", trigger.id),
                None,
            ));
        }
        if trigger.kind == TriggerKind::Unknown {
            issues.push(ValidationIssue::new(
                "WFL-VAL-002",
                format!("trigger '{}' has an unknown kind", trigger.id),
                None,
            ));
        }
        if trigger.kind == TriggerKind::Cron && !has_params(&trigger.params_json) {
            issues.push(ValidationIssue::new(
                "WFL-VAL-003",
                format!("cron trigger '{}' requires non-empty params", trigger.id),
                None,
            ));
        }
    }
}

fn has_params(params_json: &str) -> bool {
    match serde_json::from_str::<Value>(params_json) {
        Ok(Value::Object(map)) => !map.is_empty(),
        Ok(Value::Null) => false,
        Ok(_) => true,
        Err(_) => false,
    }
}

fn check_dependencies(document: &WorkflowDocument, issues: &mut Vec<ValidationIssue>) {
    for (key, task) in &document.tasks {
        for dep in &task.depends_on {
            if !document.tasks.contains_key(dep) {
                issues.push(ValidationIssue::new(
                    "WFL-VAL-004",
                    format!("task '{}' depends on unknown task '{}'", key, dep),
                    Some(key.clone()),
                ));
            }
        }
    }
}

fn check_slots(document: &WorkflowDocument, issues: &mut Vec<ValidationIssue>) {
    for (key, task) in &document.tasks {
        for (slot, input) in &task.inputs {
            if input.required && input.type_hint.is_empty() {
                issues.push(ValidationIssue::new(
                    "WFL-VAL-005",
                    format!(
                        "task '{}' required input slot '{}' has no type hint",
                        key, slot
                    ),
                    Some(key.clone()),
                ));
            }
        }
        for (slot, output) in &task.outputs {
            if output.type_hint.is_empty() {
                issues.push(ValidationIssue::new(
                    "WFL-VAL-005",
                    format!("task '{}' output slot '{}' has no type hint", key, slot),
                    Some(key.clone()),
                ));
            }
        }
    }
}

fn check_dataflows(document: &WorkflowDocument, issues: &mut Vec<ValidationIssue>) {
    for (index, edge) in document.dataflows.iter().enumerate() {
        let from = document.tasks.get(&edge.from_task);
        let to = document.tasks.get(&edge.to_task);
        if from.is_none() {
            issues.push(ValidationIssue::new(
                "WFL-VAL-006",
                format!(
                    "dataflow[{}] references unknown source task '{}'",
                    index, edge.from_task
                ),
                None,
            ));
        }
        if to.is_none() {
            issues.push(ValidationIssue::new(
                "WFL-VAL-006",
                format!(
                    "dataflow[{}] references unknown target task '{}'",
                    index, edge.to_task
                ),
                None,
            ));
        }
        if let Some(task) = from {
            if !edge.from_output.is_empty() && !task.outputs.contains_key(&edge.from_output) {
                issues.push(ValidationIssue::new(
                    "WFL-VAL-007",
                    format!(
                        "dataflow[{}] source task '{}' declares no output slot '{}'",
                        index, edge.from_task, edge.from_output
                    ),
                    Some(edge.from_task.clone()),
                ));
            }
        }
        if let Some(task) = to {
            if !edge.to_input.is_empty() && !task.inputs.contains_key(&edge.to_input) {
                issues.push(ValidationIssue::new(
                    "WFL-VAL-007",
                    format!(
                        "dataflow[{}] target task '{}' declares no input slot '{}'",
                        index, edge.to_task, edge.to_input
                    ),
                    Some(edge.to_task.clone()),
                ));
            }
        }
    }
}

fn check_cycles(document: &WorkflowDocument, issues: &mut Vec<ValidationIssue>) {
    let (graph, node_map) = build_dependency_graph(document);
    for scc in tarjan_scc(&graph) {
        if scc.len() > 1 {
            let participant = &graph[scc[0]];
            issues.push(ValidationIssue::new(
                "WFL-VAL-008",
                format!("dependency cycle involving task '{}'", participant),
                Some(participant.clone()),
            ));
        }
    }
    // Tarjan reports self-loops as singleton components; catch them directly.
    for (key, task) in &document.tasks {
        if task.depends_on.contains(key) && node_map.contains_key(key.as_str()) {
            issues.push(ValidationIssue::new(
                "WFL-VAL-008",
                format!("task '{}' depends on itself", key),
                Some(key.clone()),
            ));
        }
    }
}

fn build_dependency_graph(
    document: &WorkflowDocument,
) -> (DiGraph<String, ()>, HashMap<&str, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut node_map = HashMap::new();
    for key in document.tasks.keys() {
        let node = graph.add_node(key.clone());
        node_map.insert(key.as_str(), node);
    }
    for (key, task) in &document.tasks {
        for dep in &task.depends_on {
            if let (Some(&from), Some(&to)) =
                (node_map.get(dep.as_str()), node_map.get(key.as_str()))
            {
                graph.add_edge(from, to, ());
            }
        }
    }
    (graph, node_map)
}
