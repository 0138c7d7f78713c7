//! Fileconv - batch and pipeline file conversion
//!
//! Entry point: parses the command line, sets up logging and runs the
//! requested job on a blocking worker while the main task draws progress.

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fileconv::backend::{Backend, Backends};
use fileconv::cli::{Args, Commands, ConfigAction, PipelineAction};
use fileconv::command::{run_command, CommandRunner, OutputRule, StageCommand};
use fileconv::config::{Config, DEFAULT_CONFIG_FILENAME};
use fileconv::pipeline::{Pipeline, PIPELINE_CONFIG_FILENAME};
use fileconv::status::JobStatus;

/// How often the progress bar polls the job status
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging needs log_dir, so the config is read first
    let (config, config_path) = Config::load(args.config.as_deref())?;
    let _guard = setup_logging(args.verbose, &config.general.log_dir)?;
    match &config_path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("Using default configuration"),
    }

    let overwrite = args.overwrite || config.general.overwrite_output;
    let show_progress = config.general.show_progress && !args.no_progress;
    let runner = Arc::new(CommandRunner::new(Backends::from_config(&config)));

    match args.command {
        Commands::Pipeline { action } => match action {
            PipelineAction::Create { dir, stages } => {
                if dir.join(PIPELINE_CONFIG_FILENAME).exists() && !overwrite {
                    bail!(
                        "Pipeline already exists in {} (use --overwrite to replace it)",
                        dir.display()
                    );
                }

                let mut pipeline = Pipeline::create(&dir);
                for (i, stage) in stages.iter().enumerate() {
                    pipeline.add_stage(&format!("stage_{}", i + 1), StageCommand::parse(stage)?)?;
                }
                pipeline.save_config()?;
                print!("{}", pipeline.describe());
            }
            PipelineAction::Execute { dir } => {
                let pipeline = Pipeline::load(&dir)?;
                let label = format!("pipeline {}", dir.display());
                let worker = Arc::clone(&runner);

                let report = run_job(label, show_progress, move |sink| {
                    pipeline.execute(worker.as_ref(), overwrite, sink)
                })
                .await?;

                info!("Pipeline completed: {} stage(s)", report.stages_run);
                print_paths(&report.outputs);
            }
            PipelineAction::Show { dir } => {
                print!("{}", Pipeline::load(&dir)?.describe());
            }
        },

        Commands::Formats => print_formats(runner.backends()),

        Commands::Config { action } => match action {
            ConfigAction::Show => print!("{}", toml::to_string_pretty(&config)?),
            ConfigAction::Init { path } => {
                let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
                if path.exists() && !overwrite {
                    bail!("{} already exists (use --overwrite to replace it)", path.display());
                }
                Config::default().save_to_file(&path)?;
                println!("Wrote default configuration to {}", path.display());
            }
        },

        conversion => {
            let conversion = conversion.into_conversion()?;
            let check_only = conversion.command.output_rule() == OutputRule::CheckOnly;
            let label = conversion.command.to_string();
            let worker = Arc::clone(&runner);

            let report = run_job(label, show_progress, move |sink| {
                let descriptor = conversion.command.descriptor(
                    conversion.inputs,
                    &conversion.output_dir,
                    conversion.output_file,
                    overwrite,
                );
                run_command(worker.as_ref(), &conversion.command, descriptor, sink)
            })
            .await?;

            if check_only {
                for path in &report.outputs {
                    println!("{}: OK", path.display());
                }
            } else {
                print_paths(&report.outputs);
            }
        }
    }

    Ok(())
}

/// Run `job` on a blocking worker and mirror its status into a progress bar.
async fn run_job<T, F>(label: String, show_progress: bool, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn FnMut(f64)) -> fileconv::error::Result<T> + Send + 'static,
{
    let status = JobStatus::new(label.clone());
    let worker_status = status.clone();
    let mut handle = tokio::task::spawn_blocking(move || worker_status.run(job));

    let bar = if show_progress {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
                )?
                .progress_chars("#>-"),
        );
        bar
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(label);

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let joined = loop {
        tokio::select! {
            joined = &mut handle => break joined,
            _ = ticker.tick() => bar.set_position(status.snapshot().progress.round() as u64),
        }
    };

    let result = joined.map_err(|e| anyhow!("Worker task failed: {}", e))?;
    match &result {
        Ok(_) => {
            bar.set_position(100);
            bar.finish_with_message("done");
        }
        Err(_) => bar.abandon_with_message("failed"),
    }

    info!("Job status: {}", status.to_json()?);
    Ok(result?)
}

fn print_paths(paths: &[PathBuf]) {
    for path in paths {
        println!("{}", path.display());
    }
}

fn print_formats(backends: &Backends) {
    println!("\nBackends:");
    println!("{:<12} {:<10} {:<40} {}", "Name", "Status", "Reads", "Writes");
    println!("{}", "-".repeat(100));

    for backend in backends.all() {
        let status = match backend.check_availability() {
            Ok(()) => "ready",
            Err(_) => "missing",
        };
        println!(
            "{:<12} {:<10} {:<40} {}",
            backend.name(),
            status,
            backend.supported_in_formats().join(","),
            backend.supported_out_formats().join(",")
        );
        let deps = backend.external_dependencies();
        if !deps.is_empty() {
            println!("{:<12} requires: {}", "", deps.join(", "));
        }
    }
}

fn setup_logging(verbose: bool, log_dir: &str) -> Result<WorkerGuard> {
    let log_dir = Path::new(log_dir);
    std::fs::create_dir_all(log_dir)?;

    // Daily rotated file, written off the hot path
    let file_appender = rolling::daily(log_dir, "fileconv.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // stdout carries command output, so the console log goes to stderr
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("fileconv.log").display()
    );
    Ok(guard)
}
