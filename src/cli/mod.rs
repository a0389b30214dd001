//! Thin command-line surface over the workflow runtime.

use crate::core::workflow::binder;
use crate::core::workflow::executor::ExecutorRegistry;
use crate::core::workflow::executors;
use crate::core::workflow::orchestrator::Orchestrator;
use crate::core::workflow::registry::WorkflowRegistry;
use crate::core::workflow::trigger::{TriggerCallback, TriggerEngine};
use crate::Result;
use anyhow::{anyhow, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "waveflow", version = crate::VERSION, about = "Declarative workflow runtime")]
pub struct Cli {
    /// Log filter, e.g. "info" or "waveflow=debug"
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Also append logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load a workflow directory and report validation findings
    Validate(DirArgs),
    /// List the workflows registered in a directory
    List(DirArgs),
    /// Execute one workflow once and print the run snapshot
    Run(RunArgs),
    /// Bind triggers and keep firing them (immediate + cron) until interrupted
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct DirArgs {
    /// Directory containing .jcwf workflow files
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,
}

#[derive(Args)]
pub struct RunArgs {
    /// Directory containing .jcwf workflow files
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Workflow id to run
    #[arg(long, value_name = "ID")]
    pub workflow: String,

    /// Use this run id instead of a generated one
    #[arg(long, value_name = "RUN_ID")]
    pub run_id: Option<String>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Directory containing .jcwf workflow files
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Cron tick interval in milliseconds
    #[arg(long, default_value = "1000", value_name = "MS")]
    pub tick_ms: u64,
}

pub async fn run(cli: Cli) -> Result<()> {
    let _guard = crate::logging::init(cli.log_level.as_deref(), cli.log_file.as_deref())?;
    match cli.command {
        Command::Validate(args) => validate(args),
        Command::List(args) => list(args),
        Command::Run(args) => run_once(args).await,
        Command::Serve(args) => serve(args).await,
    }
}

fn load_registry(dir: &PathBuf) -> Result<WorkflowRegistry> {
    let mut registry = WorkflowRegistry::new();
    let loaded = registry.load_directory(dir)?;
    if loaded == 0 {
        bail!("no workflows found in {}", dir.display());
    }
    Ok(registry)
}

fn validate(args: DirArgs) -> Result<()> {
    let registry = load_registry(&args.dir)?;
    let mut invalid = 0;
    for (id, issues) in registry.validate_all() {
        if issues.is_empty() {
            println!("{}: ok", id);
        } else {
            invalid += 1;
            println!("{}: {} issue(s)", id, issues.len());
            for issue in issues {
                println!("  [{}] {}", issue.code, issue.message);
            }
        }
    }
    if invalid > 0 {
        bail!("{} workflow(s) failed validation", invalid);
    }
    Ok(())
}

fn list(args: DirArgs) -> Result<()> {
    let registry = load_registry(&args.dir)?;
    for id in registry.get_workflow_ids() {
        let document = registry
            .get_workflow(&id)
            .ok_or_else(|| anyhow!("workflow '{}' disappeared from registry", id))?;
        println!(
            "{}  tasks={}  triggers={}  hash={}",
            id,
            document.tasks.len(),
            document.triggers.len(),
            &document.content_hash[..12.min(document.content_hash.len())]
        );
    }
    Ok(())
}

fn default_executors() -> ExecutorRegistry {
    let mut builder = ExecutorRegistry::builder();
    executors::register_builtins(&mut builder);
    builder.build()
}

async fn run_once(args: RunArgs) -> Result<()> {
    let registry = Arc::new(load_registry(&args.dir)?);
    let orchestrator = Orchestrator::new(registry, default_executors());

    let started = Instant::now();
    let run = orchestrator
        .run_workflow_once(&args.workflow, args.run_id)
        .await?;
    println!("{}", serde_json::to_string_pretty(&run)?);
    println!(
        "run {} finished as {} in {}",
        run.run_id,
        run.state.as_str(),
        humantime::format_duration(started.elapsed())
    );
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let registry = Arc::new(load_registry(&args.dir)?);
    let orchestrator = Arc::new(Orchestrator::new(registry.clone(), default_executors()));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(String, String)>();
    let callback: TriggerCallback = Arc::new(move |workflow_id: &str, trigger_id: &str| {
        // Hand off to the orchestrator loop; firing threads never run tasks.
        let _ = tx.send((workflow_id.to_string(), trigger_id.to_string()));
    });

    let mut engine = TriggerEngine::new(callback);
    let bound = binder::bind_registry_triggers(&registry, &mut engine, Local::now());
    tracing::info!(bound, "triggers bound, serving");

    let mut interval = tokio::time::interval(std::time::Duration::from_millis(args.tick_ms.max(1)));
    loop {
        tokio::select! {
            request = rx.recv() => {
                let Some((workflow_id, trigger_id)) = request else { break };
                tracing::info!(workflow = %workflow_id, trigger = %trigger_id, "trigger fired");
                if let Err(err) = orchestrator.run_workflow_once(&workflow_id, None).await {
                    tracing::error!(workflow = %workflow_id, "run failed to start: {}", err);
                }
            }
            _ = interval.tick() => {
                engine.tick(Local::now());
            }
        }
    }
    Ok(())
}
