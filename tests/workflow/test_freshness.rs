use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use waveflow::core::workflow::document::WorkflowDocument;
use waveflow::core::workflow::freshness::is_up_to_date;
use waveflow::core::workflow::parser::parse_document;

const CHAIN_WORKFLOW: &str = r#"
{
  "version": "1.0",
  "id": "chain",
  "tasks": {
    "compile": {},
    "archive": {"depends_on": ["compile"]},
    "link": {"depends_on": ["archive"]}
  }
}
"#;

fn document() -> WorkflowDocument {
    parse_document(CHAIN_WORKFLOW, "chain.jcwf").unwrap()
}

fn write(dir: &TempDir, name: &str, mtime_offset_secs: i64) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, name).unwrap();
    set_mtime(&path, mtime_at(mtime_offset_secs));
    path
}

fn set_mtime(path: &Path, time: SystemTime) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}

fn mtime_at(offset_secs: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs((1_700_000_000 + offset_secs) as u64)
}

fn no_upstream(_task: &str) -> Option<Vec<PathBuf>> {
    Some(Vec::new())
}

#[test]
fn task_without_outputs_is_never_up_to_date() {
    let dir = TempDir::new().unwrap();
    let document = document();
    let input = write(&dir, "in.txt", 0);
    assert!(!is_up_to_date(&document, "compile", &[input], &[], &no_upstream));
}

#[test]
fn missing_input_forces_rebuild() {
    let dir = TempDir::new().unwrap();
    let document = document();
    let output = write(&dir, "out.txt", 0);
    let missing = dir.path().join("never-written.txt");
    assert!(!is_up_to_date(
        &document,
        "compile",
        &[missing],
        &[output],
        &no_upstream
    ));
}

#[test]
fn missing_output_forces_rebuild() {
    let dir = TempDir::new().unwrap();
    let document = document();
    let input = write(&dir, "in.txt", 0);
    let missing = dir.path().join("out.txt");
    assert!(!is_up_to_date(
        &document,
        "compile",
        &[input],
        &[missing],
        &no_upstream
    ));
}

#[test]
fn newer_outputs_are_up_to_date() {
    let dir = TempDir::new().unwrap();
    let document = document();
    let input = write(&dir, "in.txt", 0);
    let output = write(&dir, "out.txt", 10);
    assert!(is_up_to_date(
        &document,
        "compile",
        &[input],
        &[output],
        &no_upstream
    ));
}

#[test]
fn touching_an_input_invalidates_the_output() {
    let dir = TempDir::new().unwrap();
    let document = document();
    let input = write(&dir, "in.txt", 0);
    let output = write(&dir, "out.txt", 10);
    assert!(is_up_to_date(&document, "compile", &[input.clone()], &[output.clone()], &no_upstream));

    set_mtime(&input, mtime_at(20));
    assert!(!is_up_to_date(
        &document,
        "compile",
        &[input],
        &[output],
        &no_upstream
    ));
}

#[test]
fn equal_timestamps_count_as_up_to_date() {
    // Files written in the same filesystem tick must not trigger a rebuild.
    let dir = TempDir::new().unwrap();
    let document = document();
    let input = write(&dir, "in.txt", 5);
    let output = write(&dir, "out.txt", 5);
    assert!(is_up_to_date(
        &document,
        "compile",
        &[input],
        &[output],
        &no_upstream
    ));
}

#[test]
fn output_only_task_is_up_to_date_once_outputs_exist() {
    let dir = TempDir::new().unwrap();
    let document = document();
    let output = write(&dir, "out.txt", 0);
    assert!(is_up_to_date(&document, "compile", &[], &[output], &no_upstream));
}

#[test]
fn stale_against_transitive_upstream_outputs() {
    let dir = TempDir::new().unwrap();
    let document = document();
    let compile_out = write(&dir, "a.o", 30);
    let archive_out = write(&dir, "lib.a", 20);
    let link_out = write(&dir, "exe", 25);

    let resolver = |task: &str| -> Option<Vec<PathBuf>> {
        match task {
            "compile" => Some(vec![compile_out.clone()]),
            "archive" => Some(vec![archive_out.clone()]),
            _ => None,
        }
    };

    // link's direct input lib.a (t=20) is older than exe (t=25), but the
    // transitive compile output (t=30) is newer.
    assert!(!is_up_to_date(
        &document,
        "link",
        &[archive_out.clone()],
        &[link_out.clone()],
        &resolver
    ));

    set_mtime(&link_out, mtime_at(40));
    assert!(is_up_to_date(
        &document,
        "link",
        &[archive_out.clone()],
        &[link_out.clone()],
        &resolver
    ));
}

#[test]
fn unresolvable_upstream_forces_rebuild() {
    let dir = TempDir::new().unwrap();
    let document = document();
    let input = write(&dir, "lib.a", 0);
    let output = write(&dir, "exe", 10);

    let resolver = |_task: &str| -> Option<Vec<PathBuf>> { None };
    assert!(!is_up_to_date(
        &document,
        "link",
        &[input],
        &[output],
        &resolver
    ));
}

#[test]
fn missing_upstream_output_file_forces_rebuild() {
    let dir = TempDir::new().unwrap();
    let document = document();
    let input = write(&dir, "lib.a", 0);
    let output = write(&dir, "exe", 10);
    let ghost = dir.path().join("a.o");

    let resolver = move |task: &str| -> Option<Vec<PathBuf>> {
        match task {
            "compile" => Some(vec![ghost.clone()]),
            "archive" => Some(Vec::new()),
            _ => None,
        }
    };
    assert!(!is_up_to_date(
        &document,
        "link",
        &[input],
        &[output],
        &resolver
    ));
}

#[test]
fn diamond_dependencies_terminate() {
    let text = r#"
    {
      "version": "1.0", "id": "diamond",
      "tasks": {
        "root": {},
        "left": {"depends_on": ["root"]},
        "right": {"depends_on": ["root"]},
        "join": {"depends_on": ["left", "right"]}
      }
    }
    "#;
    let document = parse_document(text, "diamond.jcwf").unwrap();
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "in.txt", 0);
    let output = write(&dir, "out.txt", 10);
    let shared = write(&dir, "shared.o", 5);

    let resolver = |_task: &str| -> Option<Vec<PathBuf>> { Some(vec![shared.clone()]) };
    assert!(is_up_to_date(
        &document,
        "join",
        &[input],
        &[output],
        &resolver
    ));
}

#[test]
fn unknown_task_is_not_up_to_date() {
    let dir = TempDir::new().unwrap();
    let document = document();
    let output = write(&dir, "out.txt", 0);
    assert!(!is_up_to_date(&document, "ghost", &[], &[output], &no_upstream));
}
