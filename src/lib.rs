// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod progress;
pub mod protocol;
pub mod resolve;
pub mod services;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, default_config_path, load_and_validate};
use crate::exec::{
    ChannelSink, JobEvent, JobOutcome, Supervisor, SupervisorOptions, WorkerCommand,
};
use crate::fs::RealFileSystem;
use crate::resolve::AnalysisResult;
use crate::services::{
    CredentialStore, EnvCredentialStore, FileDialog, OutputActions, TerminalFileDialog,
    spawn_cleanup_detached,
};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - credential lookup and input selection
/// - one supervised worker job and its event stream
/// - Ctrl-C handling (cancels the job)
/// - the cleanup hook at shutdown
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)?;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| cfg.worker.output_dir.clone());

    if args.dry_run {
        let input = args.input.clone().unwrap_or_else(|| PathBuf::from("<input>"));
        let command = WorkerCommand::for_analysis(&cfg.worker, &input, &output_dir, None);
        print_dry_run(&cfg, &command);
        return Ok(());
    }

    let input = match args.input.clone() {
        Some(input) => input,
        None => TerminalFileDialog
            .choose_input_file()
            .ok_or_else(|| anyhow!("no input file selected; pass --input <PATH>"))?,
    };

    let credentials = EnvCredentialStore::new();
    let api_key = cfg
        .credentials
        .api_key
        .as_deref()
        .and_then(|name| credentials.get_credential(name));
    if cfg.credentials.api_key.is_some() && api_key.is_none() {
        warn!("configured API key credential is not set; running without --api_key");
    }

    let command = WorkerCommand::for_analysis(&cfg.worker, &input, &output_dir, api_key.as_deref());
    let outcome = run_job(&cfg, &command, args.json).await;

    // Best-effort, never awaited.
    spawn_cleanup_detached(&cfg);

    match outcome? {
        JobOutcome::Succeeded(result) => {
            print_result(&result, args.json)?;
            finish_successful(&result, &args).await;
            Ok(())
        }
        JobOutcome::Failed(err) => Err(err.into()),
        JobOutcome::Cancelled => bail!("job was cancelled"),
    }
}

/// Spawn the worker and print its events until the terminal one.
async fn run_job(cfg: &ConfigFile, command: &WorkerCommand, json: bool) -> Result<JobOutcome> {
    let (sink, mut events) = ChannelSink::new();
    let supervisor = Arc::new(Supervisor::new(
        Arc::new(sink),
        SupervisorOptions::from_worker(&cfg.worker),
    ));

    let handle = supervisor.spawn(command)?;
    let id = handle.id();
    info!(job = %id, "job running");

    // Ctrl-C -> cancel the job; its terminal event ends the loop below.
    {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let outcome = supervisor.cancel(id).await;
            debug!(job = %id, ?outcome, "Ctrl+C cancellation");
        });
    }

    while let Some(event) = events.recv().await {
        print_event(&event, json)?;
        if event.is_terminal() {
            break;
        }
    }

    Ok(handle.wait().await)
}

fn print_event(event: &JobEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        JobEvent::Log { line, .. } => println!("{line}"),
        JobEvent::Progress { state, .. } => {
            println!("[{:>3}%] {}", state.percent, state.status_text)
        }
        JobEvent::Terminal { job, outcome } => match outcome {
            JobOutcome::Succeeded(_) => println!("job {job} succeeded"),
            JobOutcome::Failed(err) => println!("job {job} failed ({}): {err}", err.kind()),
            JobOutcome::Cancelled => println!("job {job} cancelled"),
        },
    }
    Ok(())
}

fn print_result(result: &AnalysisResult, json: bool) -> Result<()> {
    let summary = result.summary();
    if json {
        println!("{}", serde_json::to_string(&summary)?);
        return Ok(());
    }

    println!("result: {}", result.artifact_path.display());
    if let Some(name) = &summary.project_name {
        println!("  project: {name}");
    }
    println!("  invoice pairs: {}", summary.pair_count);
    for (label, count) in &summary.classifications {
        println!("    {label}: {count}");
    }
    Ok(())
}

/// Post-success actions requested on the command line. Failures are logged.
async fn finish_successful(result: &AnalysisResult, args: &CliArgs) {
    let actions = OutputActions::new(Arc::new(RealFileSystem));

    if args.open_output {
        if let Err(e) = actions.open_output_folder(result) {
            warn!(error = %e, "could not open output folder");
        }
    }

    if args.delete_result {
        // Awaited only because the runtime is about to shut down.
        if let Err(e) = actions.delete_result_file(result).await {
            warn!(error = %e, "result file deletion task failed");
        }
    }
}

/// Dry-run output: resolved worker settings and the exact invocation.
fn print_dry_run(cfg: &ConfigFile, command: &WorkerCommand) {
    let worker = &cfg.worker;
    println!("workerwatch dry-run");
    println!("  worker.program = {}", worker.program);
    println!("  worker.script = {}", worker.script.display());
    println!("  worker.working_dir = {}", worker.working_dir.display());
    println!("  worker.output_dir = {}", worker.output_dir.display());
    println!("  worker.cancel_grace = {:?}", worker.cancel_grace);
    if !worker.env.is_empty() {
        println!("  worker.env = {:?}", worker.env);
    }
    if let Some(name) = &cfg.credentials.api_key {
        println!("  credentials.api_key = {name} (value not shown)");
    }
    if let Some(cleanup) = &cfg.hooks.cleanup_on_exit {
        println!("  hooks.cleanup_on_exit = {cleanup:?}");
    }
    println!();
    println!("invocation:");
    println!("  {} {}", command.program, command.redacted_args().join(" "));

    debug!("dry-run complete (no execution)");
}
