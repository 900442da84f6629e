// src/exec/process/mod.rs

//! Process-backed executor.
//!
//! Worker processes have their own address space, so progress and
//! cancellation cross the boundary over the line protocol in [`wire`]:
//! the child writes `@tg` frames on stdout, the host answers `cancel`
//! and `ack` on stdin. Commands that cannot speak the protocol can still
//! report progress through [`submit_monitored`], which scrapes their
//! stdout with a [`ProgressPattern`].
//!
//! [`submit_monitored`]: ProcessPoolExecutor::submit_monitored

pub mod child;
pub mod monitor;
pub mod wire;

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::{Result, TaskgaugeError};
use crate::exec::CellRegistry;
use crate::handle::TaskHandle;
use crate::handle::slot::CompletionSlot;
use crate::progress::{ProgressCell, ProgressSnapshot, TaskState};

pub use child::{EXIT_CANCELLED, EXIT_DONE, EXIT_ERROR, run_child, run_child_io};
pub use monitor::{PatternHit, ProgressPattern};
pub use wire::{Frame, HostLine, WIRE_VERSION};

/// A command to run in a worker process.
#[derive(Debug, Clone)]
pub struct CommandTask {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl CommandTask {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
        }
    }

    /// Run `cmdline` through the platform shell, like the system's
    /// `sh -c` (or `cmd /C` on Windows).
    pub fn shell(cmdline: impl Into<String>) -> Self {
        if cfg!(windows) {
            Self::new("cmd").arg("/C").arg(cmdline)
        } else {
            Self::new("sh").arg("-c").arg(cmdline)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Command line as logged; not shell-quoted.
    fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }
}

/// Executor running each task in its own worker process, at most
/// `workers` at a time.
///
/// A submission spawns one supervisor per task; the semaphore is what
/// bounds concurrency, so queued tasks are supervisors parked on the
/// acquire. [`shutdown`](Self::shutdown) tears the pool down exactly
/// once, after the last child has exited; dropping the executor without
/// a shutdown aborts the supervisors, which kills their children.
pub struct ProcessPoolExecutor {
    semaphore: Arc<Semaphore>,
    supervisors: Mutex<Option<JoinSet<()>>>,
    registry: Arc<CellRegistry>,
}

impl ProcessPoolExecutor {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(TaskgaugeError::ConfigError(
                "worker count must be at least 1".into(),
            ));
        }
        debug!(workers, "process pool started");
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            supervisors: Mutex::new(Some(JoinSet::new())),
            registry: Arc::new(CellRegistry::default()),
        })
    }

    /// Run a wire worker and decode its result frame as `R`.
    ///
    /// The command must speak the wire protocol on its stdio, in
    /// practice a binary whose `main` wraps [`run_child`]. Cancellation
    /// is delivered as a `cancel` line on the child's stdin and honoured
    /// at the child's next refresh.
    pub fn submit<R>(&self, task: CommandTask) -> Result<TaskHandle<R>>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let (cell, slot) = self.allocate::<R>()?;
        let supervisor = WireSupervisor {
            task,
            cell: Arc::clone(&cell),
            slot: Arc::clone(&slot),
            semaphore: Arc::clone(&self.semaphore),
        };
        self.spawn_supervisor(supervisor.run())?;
        Ok(TaskHandle::new(cell, slot))
    }

    /// Run a plain command, deriving progress from stdout lines matching
    /// `pattern`.
    ///
    /// The command gets no cancellation channel; `cancel()` kills the
    /// process. Resolves to the exit status on success; a non-zero exit
    /// is reported as an error.
    pub fn submit_monitored(
        &self,
        task: CommandTask,
        pattern: ProgressPattern,
    ) -> Result<TaskHandle<ExitStatus>> {
        let (cell, slot) = self.allocate::<ExitStatus>()?;
        let supervisor = MonitorSupervisor {
            task,
            pattern,
            cell: Arc::clone(&cell),
            slot: Arc::clone(&slot),
            semaphore: Arc::clone(&self.semaphore),
        };
        self.spawn_supervisor(supervisor.run())?;
        Ok(TaskHandle::new(cell, slot))
    }

    /// Close the pool. Later submissions fail with `Shutdown`; queued
    /// tasks that never acquired a worker resolve as shut down (or
    /// cancelled, with `cancel_pending`).
    ///
    /// With `wait`, returns after every supervisor (and therefore every
    /// child) has finished. Without it, a detached drain reaps them in
    /// the background. Either way teardown happens once; repeated calls
    /// are no-ops.
    pub async fn shutdown(&self, wait: bool, cancel_pending: bool) {
        let set = self
            .supervisors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(mut set) = set else { return };
        debug!(wait, cancel_pending, "process pool shutting down");
        if cancel_pending {
            self.registry.cancel_all();
        }
        self.semaphore.close();
        if wait {
            while set.join_next().await.is_some() {}
            debug!("process pool drained");
        } else {
            tokio::spawn(async move {
                while set.join_next().await.is_some() {}
                debug!("process pool drained");
            });
        }
    }

    fn allocate<R>(&self) -> Result<(Arc<ProgressCell>, Arc<CompletionSlot<R>>)> {
        let cell = Arc::new(ProgressCell::new());
        self.registry.register(&cell);
        Ok((cell, Arc::new(CompletionSlot::new())))
    }

    fn spawn_supervisor<F>(&self, fut: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.supervisors.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(set) => {
                set.spawn(fut);
                Ok(())
            }
            None => Err(TaskgaugeError::Shutdown),
        }
    }
}

struct WireSupervisor<R> {
    task: CommandTask,
    cell: Arc<ProgressCell>,
    slot: Arc<CompletionSlot<R>>,
    semaphore: Arc<Semaphore>,
}

impl<R: DeserializeOwned + Send + 'static> WireSupervisor<R> {
    async fn run(self) {
        let command = self.task.display();
        let outcome = match acquire_worker(&self.semaphore, &self.cell).await {
            Ok(_permit) => self.supervise(&command).await,
            Err(err) => Err(err),
        };
        finish(&self.cell, &self.slot, outcome, &command);
    }

    async fn supervise(&self, command: &str) -> Result<R> {
        info!(command, "starting wire worker");
        let mut child = spawn_child(&self.task, Stdio::piped())?;
        let mut stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .context("wire worker has no stdout pipe")?;
        drain_stderr(&mut child, command);

        let mut lines = BufReader::new(stdout).lines();
        let mut hello_seen = false;
        let mut cancel_sent = false;
        let mut terminal: Option<Result<R>> = None;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(err) => {
                            terminal.get_or_insert(Err(TaskgaugeError::StateSync(format!(
                                "reading worker stdout: {err}"
                            ))));
                            break;
                        }
                    };
                    match Frame::parse(&line) {
                        None => debug!(command, "stdout: {line}"),
                        Some(Err(err)) => {
                            terminal.get_or_insert(Err(TaskgaugeError::StateSync(err)));
                            break;
                        }
                        Some(Ok(frame)) => {
                            if let Some(done) =
                                self.apply_frame(frame, &mut hello_seen, &mut stdin).await
                            {
                                terminal.get_or_insert(done);
                                if terminal_is_fatal(&terminal) {
                                    break;
                                }
                            }
                        }
                    }
                }
                _ = self.cell.cancel_flag().wait(), if !cancel_sent => {
                    cancel_sent = true;
                    info!(command, "forwarding cancellation to wire worker");
                    send_host_line(&mut stdin, HostLine::Cancel).await;
                }
            }
        }

        // A broken exchange leaves the child running; reap it either way.
        let status = stop_child(&mut child, terminal_is_fatal(&terminal)).await?;
        match terminal {
            Some(outcome) => outcome,
            None if status.success() => Err(TaskgaugeError::StateSync(
                "worker exited without a terminal frame".into(),
            )),
            None => Err(TaskgaugeError::Failed(anyhow::anyhow!(
                "wire worker exited with {status} before reporting a result"
            ))),
        }
    }

    /// Apply one frame; `Some(outcome)` once the run is decided.
    async fn apply_frame(
        &self,
        frame: Frame,
        hello_seen: &mut bool,
        stdin: &mut Option<ChildStdin>,
    ) -> Option<Result<R>> {
        if !*hello_seen {
            return match frame {
                Frame::Hello {
                    version: WIRE_VERSION,
                } => {
                    *hello_seen = true;
                    None
                }
                Frame::Hello { version } => Some(Err(TaskgaugeError::StateSync(format!(
                    "worker speaks wire version {version}, host speaks {WIRE_VERSION}"
                )))),
                other => Some(Err(TaskgaugeError::StateSync(format!(
                    "{other:?} frame before hello"
                )))),
            };
        }
        match frame {
            Frame::Hello { .. } => Some(Err(TaskgaugeError::StateSync("repeated hello".into()))),
            Frame::State(snap) => {
                self.cell.store(snap);
                if snap.state.is_terminal() {
                    // The final state is applied; let the worker exit.
                    send_host_line(stdin, HostLine::Ack).await;
                }
                None
            }
            Frame::Result(json) => Some(match serde_json::from_str::<R>(&json) {
                Ok(value) => Ok(value),
                Err(err) => Err(TaskgaugeError::StateSync(format!(
                    "malformed result payload: {err}"
                ))),
            }),
            Frame::Error(message) => Some(Err(TaskgaugeError::Failed(anyhow::anyhow!(message)))),
            Frame::Cancelled => Some(Err(TaskgaugeError::Cancelled)),
        }
    }
}

struct MonitorSupervisor {
    task: CommandTask,
    pattern: ProgressPattern,
    cell: Arc<ProgressCell>,
    slot: Arc<CompletionSlot<ExitStatus>>,
    semaphore: Arc<Semaphore>,
}

impl MonitorSupervisor {
    async fn run(self) {
        let command = self.task.display();
        let outcome = match acquire_worker(&self.semaphore, &self.cell).await {
            Ok(_permit) => self.supervise(&command).await,
            Err(err) => Err(err),
        };
        finish(&self.cell, &self.slot, outcome, &command);
    }

    async fn supervise(&self, command: &str) -> Result<ExitStatus> {
        info!(command, "starting monitored command");
        let mut child = spawn_child(&self.task, Stdio::null())?;
        let stdout = child
            .stdout
            .take()
            .context("monitored command has no stdout pipe")?;
        drain_stderr(&mut child, command);

        self.cell
            .store(ProgressSnapshot::new(0.0, 0.0, TaskState::Running));

        let mut lines = BufReader::new(stdout).lines();
        let mut amount = 0.0;
        let mut total = 0.0;
        let mut cancelled = false;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            debug!(command, "stdout: {line}");
                            if let Some(hit) = self.pattern.match_line(&line) {
                                match hit.amount {
                                    Some(value) => amount = value,
                                    None => amount += 1.0,
                                }
                                if let Some(value) = hit.total {
                                    total = value;
                                }
                                self.cell
                                    .store(ProgressSnapshot::new(amount, total, TaskState::Running));
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            warn!(command, error = %err, "stopped reading command stdout");
                            break;
                        }
                    }
                }
                _ = self.cell.cancel_flag().wait(), if !cancelled => {
                    // No cooperative channel to a plain command; kill it.
                    cancelled = true;
                    info!(command, "cancellation requested; killing monitored command");
                    if let Err(err) = child.start_kill() {
                        warn!(command, error = %err, "failed to kill monitored command");
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for '{command}'"))?;
        if cancelled {
            return Err(TaskgaugeError::Cancelled);
        }
        info!(command, exit_code = status.code().unwrap_or(-1), "monitored command exited");
        if status.success() {
            Ok(status)
        } else {
            Err(TaskgaugeError::Failed(anyhow::anyhow!(
                "command '{command}' exited with {status}"
            )))
        }
    }
}

/// Park until a worker slot frees up; a cancellation or shutdown while
/// waiting resolves the task without ever spawning its child.
async fn acquire_worker(
    semaphore: &Arc<Semaphore>,
    cell: &Arc<ProgressCell>,
) -> Result<tokio::sync::OwnedSemaphorePermit> {
    let permit = tokio::select! {
        acquired = Arc::clone(semaphore).acquire_owned() => match acquired {
            Ok(permit) => permit,
            Err(_closed) if cell.cancel_requested() => return Err(TaskgaugeError::Cancelled),
            Err(_closed) => return Err(TaskgaugeError::Shutdown),
        },
        _ = cell.cancel_flag().wait() => {
            debug!("task cancelled while queued");
            return Err(TaskgaugeError::Cancelled);
        }
    };
    if cell.cancel_requested() {
        debug!("task cancelled while queued");
        return Err(TaskgaugeError::Cancelled);
    }
    Ok(permit)
}

fn spawn_child(task: &CommandTask, stdin: Stdio) -> Result<Child> {
    let mut command = task.command();
    command.stdin(stdin);
    let child = command
        .spawn()
        .with_context(|| format!("spawning '{}'", task.display()))?;
    Ok(child)
}

fn drain_stderr(child: &mut Child, command: &str) {
    if let Some(stderr) = child.stderr.take() {
        let command = command.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(command, "stderr: {line}");
            }
        });
    }
}

async fn send_host_line(stdin: &mut Option<ChildStdin>, line: HostLine) {
    let Some(pipe) = stdin.as_mut() else {
        debug!(%line, "no stdin pipe; dropping host line");
        return;
    };
    let payload = format!("{line}\n");
    if let Err(err) = pipe.write_all(payload.as_bytes()).await {
        warn!(%line, error = %err, "cannot write to worker stdin");
        *stdin = None;
        return;
    }
    if let Err(err) = pipe.flush().await {
        warn!(%line, error = %err, "cannot flush worker stdin");
        *stdin = None;
    }
}

/// Kill (when the exchange broke down) and reap the child.
async fn stop_child(child: &mut Child, kill: bool) -> Result<ExitStatus> {
    if kill {
        if let Err(err) = child.start_kill() {
            debug!(error = %err, "kill after protocol breakdown failed");
        }
    }
    let status = child.wait().await.context("waiting for worker process")?;
    Ok(status)
}

fn terminal_is_fatal<R>(terminal: &Option<Result<R>>) -> bool {
    matches!(terminal, Some(Err(TaskgaugeError::StateSync(_))))
}

/// Publish the terminal state and store the outcome, in that order, so an
/// observer that sees completion also sees the final snapshot.
fn finish<R>(
    cell: &ProgressCell,
    slot: &CompletionSlot<R>,
    outcome: Result<R>,
    command: &str,
) {
    // A cancelled child that still produced a result does not count as
    // done; the cancellation claims the outcome.
    let outcome = if outcome.is_ok() && cell.cancel_requested() {
        Err(TaskgaugeError::Cancelled)
    } else {
        outcome
    };
    let state = match &outcome {
        Ok(_) => TaskState::Done,
        Err(err) if err.is_cancelled() => TaskState::Cancelled,
        Err(_) => TaskState::Error,
    };
    cell.force_state(state);
    cell.dirty_flag().raise();
    if let Err(err) = &outcome {
        debug!(command, error = %err, "worker task finished with error");
    }
    slot.set(outcome);
}
