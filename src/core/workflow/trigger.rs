//! Trigger engine: holds registered trigger instances per kind and fires an
//! application-supplied callback when conditions are met.
//!
//! Registration is expected to finish before `tick` / `notify_file_event`
//! begin (single writer, then readers). The callback runs synchronously on
//! the calling thread and must not block indefinitely; typical callbacks
//! enqueue a run request for the orchestrator.

use crate::core::workflow::cron::CronSchedule;
use chrono::{DateTime, Duration, Local};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Invoked with `(workflow_id, trigger_id)` whenever a trigger fires.
pub type TriggerCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// File-system event kinds a file-watch trigger can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
}

impl FileEventKind {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "created" => Some(FileEventKind::Created),
            "modified" => Some(FileEventKind::Modified),
            "deleted" => Some(FileEventKind::Deleted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileEventKind::Created => "created",
            FileEventKind::Modified => "modified",
            FileEventKind::Deleted => "deleted",
        }
    }
}

struct CronEntry {
    workflow_id: String,
    trigger_id: String,
    enabled: bool,
    /// None when the expression failed to parse; the trigger never fires.
    schedule: Option<CronSchedule>,
    next_fire: Option<DateTime<Local>>,
}

struct FileWatchEntry {
    workflow_id: String,
    trigger_id: String,
    enabled: bool,
    path: String,
    events: HashSet<FileEventKind>,
    debounce: Duration,
    last_fired: Option<DateTime<Local>>,
}

struct ManualEntry {
    workflow_id: String,
    trigger_id: String,
    enabled: bool,
}

pub struct TriggerEngine {
    callback: TriggerCallback,
    cron: Vec<CronEntry>,
    file_watch: Vec<FileWatchEntry>,
    manual: Vec<ManualEntry>,
    /// Exact path -> indices into `file_watch`, rebuilt after any removal.
    path_index: HashMap<String, Vec<usize>>,
}

impl TriggerEngine {
    pub fn new(callback: TriggerCallback) -> Self {
        TriggerEngine {
            callback,
            cron: Vec::new(),
            file_watch: Vec::new(),
            manual: Vec::new(),
            path_index: HashMap::new(),
        }
    }

    /// Immediate triggers fire exactly once, synchronously, at registration.
    pub fn add_immediate_trigger(&mut self, workflow_id: &str, trigger_id: &str, enabled: bool) {
        if enabled {
            tracing::debug!(workflow = workflow_id, trigger = trigger_id, "immediate trigger firing");
            (self.callback)(workflow_id, trigger_id);
        }
    }

    pub fn add_cron_trigger(
        &mut self,
        workflow_id: &str,
        trigger_id: &str,
        enabled: bool,
        schedule: Option<CronSchedule>,
        now: DateTime<Local>,
    ) {
        let next_fire = schedule
            .as_ref()
            .and_then(|schedule| schedule.next_fire_after(now));
        if let Some(next) = next_fire {
            tracing::debug!(
                workflow = workflow_id,
                trigger = trigger_id,
                next_fire = %next,
                "cron trigger registered"
            );
        }
        self.cron.push(CronEntry {
            workflow_id: workflow_id.to_string(),
            trigger_id: trigger_id.to_string(),
            enabled,
            schedule,
            next_fire,
        });
    }

    pub fn add_file_watch_trigger(
        &mut self,
        workflow_id: &str,
        trigger_id: &str,
        enabled: bool,
        path: &str,
        events: HashSet<FileEventKind>,
        debounce_ms: u32,
    ) {
        let index = self.file_watch.len();
        self.file_watch.push(FileWatchEntry {
            workflow_id: workflow_id.to_string(),
            trigger_id: trigger_id.to_string(),
            enabled,
            path: path.to_string(),
            events,
            debounce: Duration::milliseconds(debounce_ms as i64),
            last_fired: None,
        });
        self.path_index
            .entry(path.to_string())
            .or_default()
            .push(index);
    }

    pub fn add_manual_trigger(&mut self, workflow_id: &str, trigger_id: &str, enabled: bool) {
        self.manual.push(ManualEntry {
            workflow_id: workflow_id.to_string(),
            trigger_id: trigger_id.to_string(),
            enabled,
        });
    }

    /// Fire every enabled cron trigger whose next fire time has arrived, then
    /// recompute its next fire time from `now`. Returns the number fired.
    pub fn tick(&mut self, now: DateTime<Local>) -> usize {
        let mut fired = 0;
        for entry in &mut self.cron {
            if !entry.enabled {
                continue;
            }
            let due = match entry.next_fire {
                Some(next) => next <= now,
                None => false,
            };
            if due {
                tracing::debug!(
                    workflow = %entry.workflow_id,
                    trigger = %entry.trigger_id,
                    "cron trigger firing"
                );
                (self.callback)(&entry.workflow_id, &entry.trigger_id);
                entry.next_fire = entry
                    .schedule
                    .as_ref()
                    .and_then(|schedule| schedule.next_fire_after(now));
                fired += 1;
            }
        }
        fired
    }

    /// Dispatch a file event to every watching trigger on that exact path.
    /// A trigger fires when the event kind is subscribed and its debounce
    /// window has elapsed (or it has never fired). Returns the number fired.
    pub fn notify_file_event(
        &mut self,
        path: &str,
        event: FileEventKind,
        now: DateTime<Local>,
    ) -> usize {
        let indices = match self.path_index.get(path) {
            Some(indices) => indices.clone(),
            None => return 0,
        };
        let mut fired = 0;
        for index in indices {
            let entry = match self.file_watch.get_mut(index) {
                Some(entry) => entry,
                None => continue,
            };
            if !entry.enabled || !entry.events.contains(&event) {
                continue;
            }
            let debounced = match entry.last_fired {
                Some(last) => now.signed_duration_since(last) >= entry.debounce,
                None => true,
            };
            if debounced {
                tracing::debug!(
                    workflow = %entry.workflow_id,
                    trigger = %entry.trigger_id,
                    path,
                    event = event.as_str(),
                    "file-watch trigger firing"
                );
                entry.last_fired = Some(now);
                let workflow_id = entry.workflow_id.clone();
                let trigger_id = entry.trigger_id.clone();
                (self.callback)(&workflow_id, &trigger_id);
                fired += 1;
            }
        }
        fired
    }

    /// Fire a manual trigger if a matching enabled one exists.
    pub fn fire_manual_trigger(&mut self, workflow_id: &str, trigger_id: &str) -> bool {
        let exists = self
            .manual
            .iter()
            .any(|entry| entry.enabled && entry.workflow_id == workflow_id && entry.trigger_id == trigger_id);
        if exists {
            (self.callback)(workflow_id, trigger_id);
        }
        exists
    }

    /// Remove every trigger registered for the given workflow.
    pub fn clear_workflow_triggers(&mut self, workflow_id: &str) {
        self.cron.retain(|entry| entry.workflow_id != workflow_id);
        self.file_watch.retain(|entry| entry.workflow_id != workflow_id);
        self.manual.retain(|entry| entry.workflow_id != workflow_id);
        self.rebuild_path_index();
    }

    fn rebuild_path_index(&mut self) {
        self.path_index.clear();
        for (index, entry) in self.file_watch.iter().enumerate() {
            self.path_index
                .entry(entry.path.clone())
                .or_default()
                .push(index);
        }
    }

    /// Registered (non-immediate) trigger count, for diagnostics.
    pub fn trigger_count(&self) -> usize {
        self.cron.len() + self.file_watch.len() + self.manual.len()
    }
}
