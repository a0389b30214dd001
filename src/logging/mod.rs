use crate::Result;
use anyhow::{anyhow, Context};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_LEVEL: &str = "info";
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Guard that keeps the non-blocking file writer alive for the process lifetime.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the tracing subscriber stack: EnvFilter, console fmt layer,
/// and an optional append-mode file layer.
pub fn init(log_level: Option<&str>, log_file: Option<&Path>) -> Result<LoggingGuard> {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(anyhow!("logging already initialized"));
    }

    let level = log_level.unwrap_or(DEFAULT_LOG_LEVEL);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("failed to create log filter from '{}'", level))?;

    let console_layer = tracing_subscriber::fmt::layer().with_target(false);

    let mut file_guard = None;
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create log directory {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            file_guard = Some(guard);
            let writer = BoxMakeWriter::new(move || non_blocking.clone());
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {}", err))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
