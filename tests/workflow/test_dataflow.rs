use chrono::Utc;
use std::collections::BTreeMap;
use waveflow::core::workflow::dataflow::{resolve_task_inputs, templates_reference_inputs};
use waveflow::core::workflow::document::WorkflowDocument;
use waveflow::core::workflow::parser::parse_document;
use waveflow::core::workflow::run::{RunState, TaskInstanceState, TaskState, WorkflowRun};

const FAN_IN_WORKFLOW: &str = r#"
{
  "version": "1.0",
  "id": "fan-in",
  "tasks": {
    "p1": {"outputs": {"x": {"type": "string"}}},
    "p2": {"outputs": {"y": {"type": "string"}}},
    "c": {
      "depends_on": ["p1", "p2"],
      "inputs": {
        "x": {"type": "string", "required": true},
        "y": {"type": "string", "required": true}
      }
    }
  },
  "dataflow": [
    {"from_task": "p1", "from_output": "x", "to_task": "c", "to_input": "x"},
    {"from_task": "p2", "from_output": "y", "to_task": "c", "to_input": "y"}
  ]
}
"#;

fn document() -> WorkflowDocument {
    parse_document(FAN_IN_WORKFLOW, "fan-in.jcwf").unwrap()
}

fn empty_run(document: &WorkflowDocument) -> WorkflowRun {
    WorkflowRun {
        run_id: "fan-in-test".to_string(),
        workflow_id: document.id.clone(),
        workflow_hash: String::new(),
        state: RunState::Running,
        context: BTreeMap::new(),
        task_states: document
            .tasks
            .keys()
            .map(|key| (key.clone(), TaskInstanceState::new()))
            .collect(),
        started_at: Utc::now(),
        completed_at: None,
    }
}

fn complete_with_outputs(run: &mut WorkflowRun, task: &str, outputs: &[(&str, &str)]) {
    let state = run.task_states.get_mut(task).unwrap();
    state.kind = TaskState::Succeeded;
    for (slot, value) in outputs {
        state
            .output_values
            .insert(slot.to_string(), value.to_string());
    }
}

#[test]
fn fan_in_resolves_exact_producer_values() {
    let document = document();
    let mut run = empty_run(&document);
    complete_with_outputs(&mut run, "p1", &[("x", "alpha")]);
    complete_with_outputs(&mut run, "p2", &[("y", "beta")]);

    let resolved = resolve_task_inputs(&document, &run, "c").unwrap();
    assert_eq!(resolved.get("x").unwrap(), "alpha");
    assert_eq!(resolved.get("y").unwrap(), "beta");
    assert_eq!(resolved.len(), 2);
}

#[test]
fn missing_producer_output_fails_resolution() {
    let document = document();
    let mut run = empty_run(&document);
    complete_with_outputs(&mut run, "p1", &[("x", "alpha")]);
    // p2 finished without producing its declared output value.
    run.task_states.get_mut("p2").unwrap().kind = TaskState::Succeeded;

    let err = resolve_task_inputs(&document, &run, "c").unwrap_err();
    assert_eq!(err.code, "WFL-FLOW-003");
    assert!(err.message.contains("'y'"));
}

#[test]
fn unwired_slot_falls_back_to_run_context() {
    let text = r#"
    {
      "version": "1.0", "id": "ctx",
      "tasks": {
        "c": {"inputs": {"region": {"type": "string", "required": true}}}
      }
    }
    "#;
    let document = parse_document(text, "ctx.jcwf").unwrap();
    let mut run = empty_run(&document);

    let err = resolve_task_inputs(&document, &run, "c").unwrap_err();
    assert_eq!(err.code, "WFL-FLOW-002");

    run.context
        .insert("region".to_string(), "eu-west".to_string());
    let resolved = resolve_task_inputs(&document, &run, "c").unwrap();
    assert_eq!(resolved.get("region").unwrap(), "eu-west");
}

#[test]
fn second_pass_expands_slot_references_between_values() {
    let document = document();
    let mut run = empty_run(&document);
    complete_with_outputs(&mut run, "p1", &[("x", "alpha")]);
    complete_with_outputs(&mut run, "p2", &[("y", "${inputs.x}-beta")]);

    let resolved = resolve_task_inputs(&document, &run, "c").unwrap();
    assert_eq!(resolved.get("y").unwrap(), "alpha-beta");
}

#[test]
fn malformed_template_in_value_fails() {
    let document = document();
    let mut run = empty_run(&document);
    complete_with_outputs(&mut run, "p1", &[("x", "alpha")]);
    complete_with_outputs(&mut run, "p2", &[("y", "broken ${inputs.x")]);

    let err = resolve_task_inputs(&document, &run, "c").unwrap_err();
    assert_eq!(err.code, "WFL-FLOW-004");
}

#[test]
fn unknown_slot_reference_in_value_fails() {
    let document = document();
    let mut run = empty_run(&document);
    complete_with_outputs(&mut run, "p1", &[("x", "alpha")]);
    complete_with_outputs(&mut run, "p2", &[("y", "${inputs.zed}")]);

    let err = resolve_task_inputs(&document, &run, "c").unwrap_err();
    assert_eq!(err.code, "WFL-FLOW-005");
}

#[test]
fn template_detection_over_path_lists() {
    assert!(templates_reference_inputs(&[
        "plain.txt".to_string(),
        "out/${inputs.name}.o".to_string()
    ]));
    assert!(!templates_reference_inputs(&[
        "plain.txt".to_string(),
        "${env.HOME}/x".to_string()
    ]));
}
