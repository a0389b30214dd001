use chrono::{DateTime, Duration, Local, TimeZone};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use waveflow::core::workflow::binder::bind_trigger;
use waveflow::core::workflow::cron::CronSchedule;
use waveflow::core::workflow::document::{Trigger, TriggerKind};
use waveflow::core::workflow::trigger::{FileEventKind, TriggerCallback, TriggerEngine};

type Fired = Arc<Mutex<Vec<(String, String)>>>;

fn engine_with_collector() -> (TriggerEngine, Fired) {
    let fired: Fired = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    let callback: TriggerCallback = Arc::new(move |workflow_id: &str, trigger_id: &str| {
        sink.lock()
            .unwrap()
            .push((workflow_id.to_string(), trigger_id.to_string()));
    });
    (TriggerEngine::new(callback), fired)
}

fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn all_events() -> HashSet<FileEventKind> {
    [FileEventKind::Created, FileEventKind::Modified]
        .into_iter()
        .collect()
}

#[test]
fn immediate_trigger_fires_once_at_registration() {
    let (mut engine, fired) = engine_with_collector();
    engine.add_immediate_trigger("wf", "auto", true);
    assert_eq!(
        fired.lock().unwrap().as_slice(),
        &[("wf".to_string(), "auto".to_string())]
    );
    // Nothing is stored: ticking never replays it.
    engine.tick(Local::now());
    assert_eq!(fired.lock().unwrap().len(), 1);
}

#[test]
fn disabled_immediate_trigger_does_not_fire() {
    let (mut engine, fired) = engine_with_collector();
    engine.add_immediate_trigger("wf", "auto", false);
    assert!(fired.lock().unwrap().is_empty());
}

#[test]
fn cron_trigger_fires_on_schedule_and_recomputes() {
    let (mut engine, fired) = engine_with_collector();
    let schedule = CronSchedule::parse("5 9 * * *").unwrap();
    engine.add_cron_trigger("wf", "daily", true, Some(schedule), local(2026, 6, 1, 8, 0, 0));

    assert_eq!(engine.tick(local(2026, 6, 1, 9, 4, 59)), 0);
    assert_eq!(engine.tick(local(2026, 6, 1, 9, 5, 0)), 1);
    // Already recomputed to the next day: firing again now does nothing.
    assert_eq!(engine.tick(local(2026, 6, 1, 9, 5, 30)), 0);
    assert_eq!(engine.tick(local(2026, 6, 2, 9, 5, 0)), 1);
    assert_eq!(fired.lock().unwrap().len(), 2);
}

#[test]
fn disabled_and_invalid_cron_triggers_never_fire() {
    let (mut engine, fired) = engine_with_collector();
    let schedule = CronSchedule::parse("* * * * *").unwrap();
    engine.add_cron_trigger("wf", "off", false, Some(schedule), local(2026, 6, 1, 0, 0, 0));
    // Unparseable expression registers with no schedule.
    engine.add_cron_trigger("wf", "broken", true, None, local(2026, 6, 1, 0, 0, 0));

    assert_eq!(engine.tick(local(2026, 6, 2, 0, 0, 0)), 0);
    assert!(fired.lock().unwrap().is_empty());
}

#[test]
fn file_watch_debounce_boundary() {
    let (mut engine, fired) = engine_with_collector();
    engine.add_file_watch_trigger("wf", "watch", true, "/data/in.csv", all_events(), 1000);

    let t0 = local(2026, 6, 1, 10, 0, 0);
    assert_eq!(engine.notify_file_event("/data/in.csv", FileEventKind::Modified, t0), 1);
    // Inside the debounce window: suppressed.
    assert_eq!(
        engine.notify_file_event(
            "/data/in.csv",
            FileEventKind::Modified,
            t0 + Duration::milliseconds(999)
        ),
        0
    );
    // Exactly the debounce interval after the last fire: fires again.
    assert_eq!(
        engine.notify_file_event(
            "/data/in.csv",
            FileEventKind::Modified,
            t0 + Duration::milliseconds(1000)
        ),
        1
    );
    assert_eq!(fired.lock().unwrap().len(), 2);
}

#[test]
fn file_watch_matches_exact_path_and_event_kind() {
    let (mut engine, fired) = engine_with_collector();
    engine.add_file_watch_trigger("wf", "watch", true, "/data/in.csv", all_events(), 0);

    let now = local(2026, 6, 1, 10, 0, 0);
    assert_eq!(engine.notify_file_event("/data/other.csv", FileEventKind::Modified, now), 0);
    assert_eq!(engine.notify_file_event("/data/in.csv", FileEventKind::Deleted, now), 0);
    assert_eq!(engine.notify_file_event("/data/in.csv", FileEventKind::Created, now), 1);
    assert_eq!(fired.lock().unwrap().len(), 1);
}

#[test]
fn manual_trigger_fires_only_when_registered_and_enabled() {
    let (mut engine, fired) = engine_with_collector();
    engine.add_manual_trigger("wf", "kick", true);
    engine.add_manual_trigger("wf", "dormant", false);

    assert!(engine.fire_manual_trigger("wf", "kick"));
    assert!(!engine.fire_manual_trigger("wf", "dormant"));
    assert!(!engine.fire_manual_trigger("wf", "ghost"));
    assert!(!engine.fire_manual_trigger("other", "kick"));
    assert_eq!(
        fired.lock().unwrap().as_slice(),
        &[("wf".to_string(), "kick".to_string())]
    );
}

#[test]
fn clear_workflow_triggers_removes_and_reindexes() {
    let (mut engine, fired) = engine_with_collector();
    engine.add_file_watch_trigger("wf-a", "watch-a", true, "/shared.txt", all_events(), 0);
    engine.add_file_watch_trigger("wf-b", "watch-b", true, "/shared.txt", all_events(), 0);
    engine.add_manual_trigger("wf-a", "kick", true);
    assert_eq!(engine.trigger_count(), 3);

    engine.clear_workflow_triggers("wf-a");
    assert_eq!(engine.trigger_count(), 1);

    let now = local(2026, 6, 1, 10, 0, 0);
    assert_eq!(engine.notify_file_event("/shared.txt", FileEventKind::Modified, now), 1);
    assert!(!engine.fire_manual_trigger("wf-a", "kick"));
    let fired = fired.lock().unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].0, "wf-b");
}

#[test]
fn binder_registers_cron_from_params() {
    let (mut engine, fired) = engine_with_collector();
    let trigger = Trigger {
        kind: TriggerKind::Cron,
        id: "daily".to_string(),
        enabled: true,
        params_json: r#"{"expression": "5 9 * * *"}"#.to_string(),
    };
    assert!(bind_trigger("wf", &trigger, &mut engine, local(2026, 6, 1, 0, 0, 0)).unwrap());
    assert_eq!(engine.tick(local(2026, 6, 1, 9, 5, 0)), 1);
    assert_eq!(fired.lock().unwrap()[0], ("wf".to_string(), "daily".to_string()));
}

#[test]
fn binder_rejects_missing_required_params() {
    let (mut engine, _fired) = engine_with_collector();
    let now = local(2026, 6, 1, 0, 0, 0);

    let cron = Trigger {
        kind: TriggerKind::Cron,
        id: "c".to_string(),
        enabled: true,
        params_json: "{}".to_string(),
    };
    assert!(bind_trigger("wf", &cron, &mut engine, now).is_err());

    let watch = Trigger {
        kind: TriggerKind::FileWatch,
        id: "w".to_string(),
        enabled: true,
        params_json: r#"{"path": "/x"}"#.to_string(),
    };
    assert!(bind_trigger("wf", &watch, &mut engine, now).is_err());

    let no_known_events = Trigger {
        kind: TriggerKind::FileWatch,
        id: "w2".to_string(),
        enabled: true,
        params_json: r#"{"path": "/x", "events": ["renamed"]}"#.to_string(),
    };
    assert!(bind_trigger("wf", &no_known_events, &mut engine, now).is_err());
}

#[test]
fn binder_registers_file_watch_with_filtered_events_and_clamped_debounce() {
    let (mut engine, fired) = engine_with_collector();
    let trigger = Trigger {
        kind: TriggerKind::FileWatch,
        id: "watch".to_string(),
        enabled: true,
        params_json:
            r#"{"path": "/in.txt", "events": ["modified", "renamed"], "debounce_ms": -5}"#
                .to_string(),
    };
    let now = local(2026, 6, 1, 0, 0, 0);
    assert!(bind_trigger("wf", &trigger, &mut engine, now).unwrap());

    // The unknown event was filtered; debounce clamped to zero fires back to back.
    assert_eq!(engine.notify_file_event("/in.txt", FileEventKind::Modified, now), 1);
    assert_eq!(engine.notify_file_event("/in.txt", FileEventKind::Modified, now), 1);
    assert_eq!(engine.notify_file_event("/in.txt", FileEventKind::Created, now), 0);
    assert_eq!(fired.lock().unwrap().len(), 2);
}

#[test]
fn binder_skips_structure_triggers() {
    let (mut engine, fired) = engine_with_collector();
    let trigger = Trigger {
        kind: TriggerKind::Structure,
        id: "s".to_string(),
        enabled: true,
        params_json: "{}".to_string(),
    };
    let bound = bind_trigger("wf", &trigger, &mut engine, local(2026, 6, 1, 0, 0, 0)).unwrap();
    assert!(!bound);
    assert_eq!(engine.trigger_count(), 0);
    assert!(fired.lock().unwrap().is_empty());
}
