// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod handle;
pub mod logging;
pub mod progress;

use tracing::info;

use crate::cli::CliArgs;
use crate::config::Options;
use crate::errors::Result;
use crate::exec::process::EXIT_CANCELLED;
use crate::handle::Canceller;

pub use crate::errors::{CancelRequested, Error, TaskgaugeError};
pub use crate::exec::{
    CommandTask, ProcessPoolExecutor, ProgressPattern, SyncExecutor, ThreadPoolExecutor,
};
pub use crate::handle::TaskHandle;
pub use crate::progress::{ProgressSnapshot, TaskState, Updater, UpdaterOptions};

/// High-level entry point used by `main.rs`.
///
/// Runs one command under the process pool with a progress bar attached
/// and Ctrl-C mapped to cooperative cancellation. Returns the process
/// exit code.
pub async fn run(args: CliArgs) -> anyhow::Result<i32> {
    let options = resolve_options(&args)?;
    info!(workers = options.workers, "starting process pool");
    let pool = ProcessPoolExecutor::new(options.workers)?;

    let task = command_task(&args.command);
    let outcome = if args.wire {
        run_wire(&pool, task, &options).await
    } else {
        run_monitored(&pool, task, args.pattern.as_deref().unwrap_or(""), &options).await
    };

    // Reap the worker before reporting, so stray output cannot land after
    // the final bar state.
    pool.shutdown(true, false).await;
    outcome
}

/// Config file (explicit, or `Taskgauge.toml` when present) with CLI
/// overrides applied.
fn resolve_options(args: &CliArgs) -> Result<Options> {
    let mut options = match &args.config {
        Some(path) => config::load_and_validate(path)?,
        None => {
            let default_path = config::default_config_path();
            if default_path.exists() {
                config::load_and_validate(&default_path)?
            } else {
                Options::default()
            }
        }
    };
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(TaskgaugeError::ConfigError(
                "--workers must be at least 1".to_string(),
            ));
        }
        options.workers = workers;
    }
    Ok(options)
}

fn command_task(command: &[String]) -> CommandTask {
    // clap guarantees at least one element.
    CommandTask::new(&command[0]).args(command[1..].iter().cloned())
}

async fn run_wire(
    pool: &ProcessPoolExecutor,
    task: CommandTask,
    options: &Options,
) -> anyhow::Result<i32> {
    let mut handle = pool.submit::<serde_json::Value>(task)?;
    handle.set_poll_interval(options.poll_interval);
    handle.add_progress_bar();
    let watcher = spawn_interrupt_watcher(handle.canceller());
    let outcome = handle.observe().await;
    watcher.abort();
    match outcome {
        Ok(value) => {
            println!("{value}");
            Ok(0)
        }
        Err(TaskgaugeError::Cancelled) => {
            info!("task cancelled");
            Ok(EXIT_CANCELLED)
        }
        Err(err) => Err(err.into()),
    }
}

async fn run_monitored(
    pool: &ProcessPoolExecutor,
    task: CommandTask,
    pattern: &str,
    options: &Options,
) -> anyhow::Result<i32> {
    let pattern = ProgressPattern::new(pattern)?;
    let mut handle = pool.submit_monitored(task, pattern)?;
    handle.set_poll_interval(options.poll_interval);
    handle.add_progress_bar();
    let watcher = spawn_interrupt_watcher(handle.canceller());
    let outcome = handle.observe().await;
    watcher.abort();
    match outcome {
        Ok(status) => Ok(status.code().unwrap_or(0)),
        Err(TaskgaugeError::Cancelled) => {
            info!("command cancelled");
            Ok(EXIT_CANCELLED)
        }
        Err(err) => Err(err.into()),
    }
}

/// Ctrl-C → cooperative cancellation for the running task. The watcher
/// keeps listening so repeated interrupts stay absorbed until the task
/// actually stops.
fn spawn_interrupt_watcher(canceller: Canceller) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            info!("interrupt received; requesting cancellation");
            canceller.cancel();
        }
    })
}
