//! Supervised process handles
//!
//! This module provides the caller-facing surface of the library. A call to
//! [`spawn_process`] validates and resolves [`CreateOptions`] into a started
//! executor, spawns the reactor task that owns it, and returns a cloneable
//! [`ProcessHandle`]. Every handle method takes a caller-supplied
//! cancellation token and suspends on exactly two conditions: the reactor
//! accepts and answers the operation, or the caller's token fires / the
//! process completes, whichever is sooner.
//!
//! ## Architecture
//!
//! ```text
//! ProcessHandle ── ProcessRequest (mpsc, FIFO) ──▶ ProcessReactor ──▶ Executor
//!       ▲                                               │
//!       └────────── final snapshot (watch) ◀────────────┘
//! ```
//!
//! After the reactor publishes the final snapshot, every method takes a
//! fast path off the watch channel and never touches the request queue.

use crate::error::{CoreError, Result};
use crate::executor::{Executor, LocalExecutor};
use crate::output::{InputSource, OutputSink, SafeBuffer};
use schema::{CreateOptions, OutputSpec, ProcessInfo, Signal, StdinSpec, UNSET_EXIT_CODE};
use std::path::Path;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

mod reactor;

#[cfg(test)]
mod integration_tests;

use reactor::ProcessReactor;

/// A callback fired exactly once, on the reactor, with the final snapshot
/// of a completed process.
///
/// Triggers receive only a [`ProcessInfo`] value, never the handle, so a
/// trigger cannot keep its own process alive.
pub type ProcessTrigger = Box<dyn FnOnce(ProcessInfo) + Send>;

/// Operations dispatched from handles to the reactor
pub(crate) enum ProcessRequest {
    /// Snapshot the current process state
    GetInfo {
        /// Response channel for the snapshot
        reply: oneshot::Sender<ProcessInfo>,
    },
    /// Whether the process has started and not yet completed
    GetRunning {
        /// Response channel for the running flag
        reply: oneshot::Sender<bool>,
    },
    /// Deliver a signal to the process
    Signal {
        /// The signal to deliver
        signal: Signal,
        /// Response channel for the delivery result
        reply: oneshot::Sender<Result<()>>,
    },
    /// Append a completion trigger
    RegisterTrigger {
        /// The trigger to append
        trigger: ProcessTrigger,
        /// Response channel for the registration result
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Final state published by the reactor exactly once
#[derive(Debug, Clone)]
pub(crate) struct CompletedProcess {
    pub(crate) info: ProcessInfo,
    pub(crate) error: Option<String>,
}

/// Handle for controlling and observing one supervised process
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    id: String,
    ops: mpsc::Sender<ProcessRequest>,
    completed: watch::Receiver<Option<CompletedProcess>>,
    stdout_capture: Option<SafeBuffer>,
    stderr_capture: Option<SafeBuffer>,
}

impl ProcessHandle {
    /// The immutable process identifier. Never blocks.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The capture buffer for standard output, when the process was created
    /// with [`OutputSpec::Capture`].
    #[must_use]
    pub fn stdout(&self) -> Option<&SafeBuffer> {
        self.stdout_capture.as_ref()
    }

    /// The capture buffer for standard error, when the process was created
    /// with [`OutputSpec::Capture`].
    #[must_use]
    pub fn stderr(&self) -> Option<&SafeBuffer> {
        self.stderr_capture.as_ref()
    }

    /// Snapshot the process state.
    ///
    /// Returns a zero-valued snapshot when `ctx` has fired. After
    /// completion, returns the final snapshot without waiting on `ctx`.
    pub async fn info(&self, ctx: &CancellationToken) -> ProcessInfo {
        if let Some(done) = self.final_state() {
            return done.info;
        }
        if ctx.is_cancelled() {
            return ProcessInfo::unstarted(self.id.as_str());
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let mut completed = self.completed.clone();
        tokio::select! {
            sent = self.ops.send(ProcessRequest::GetInfo { reply: reply_tx }) => {
                if sent.is_err() {
                    return self.await_completion().await.info;
                }
            }
            () = ctx.cancelled() => return ProcessInfo::unstarted(self.id.as_str()),
            _ = completed.wait_for(|state| state.is_some()) => {
                return self.await_completion().await.info;
            }
        }

        tokio::select! {
            reply = reply_rx => match reply {
                Ok(snapshot) => snapshot,
                Err(_) => self.await_completion().await.info,
            },
            () = ctx.cancelled() => ProcessInfo::unstarted(self.id.as_str()),
            _ = completed.wait_for(|state| state.is_some()) => {
                self.await_completion().await.info
            }
        }
    }

    /// Whether the process has started and not yet completed.
    ///
    /// Returns `false` when `ctx` has fired or after completion.
    pub async fn running(&self, ctx: &CancellationToken) -> bool {
        if self.final_state().is_some() || ctx.is_cancelled() {
            return false;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let mut completed = self.completed.clone();
        tokio::select! {
            sent = self.ops.send(ProcessRequest::GetRunning { reply: reply_tx }) => {
                if sent.is_err() {
                    return false;
                }
            }
            () = ctx.cancelled() => return false,
            _ = completed.wait_for(|state| state.is_some()) => return false,
        }

        tokio::select! {
            reply = reply_rx => reply.unwrap_or(false),
            () = ctx.cancelled() => false,
            _ = completed.wait_for(|state| state.is_some()) => false,
        }
    }

    /// Whether the reactor has terminated. Never blocks.
    #[must_use]
    pub fn complete(&self, _ctx: &CancellationToken) -> bool {
        self.completed.borrow().is_some()
    }

    /// Deliver a signal to the process.
    ///
    /// Fails once the process is complete or when `ctx` has fired.
    pub async fn signal(&self, ctx: &CancellationToken, signal: Signal) -> Result<()> {
        if self.final_state().is_some() {
            return Err(self.already_complete());
        }
        if ctx.is_cancelled() {
            return Err(caller_canceled());
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let mut completed = self.completed.clone();
        tokio::select! {
            sent = self.ops.send(ProcessRequest::Signal { signal, reply: reply_tx }) => {
                if sent.is_err() {
                    return Err(self.already_complete());
                }
            }
            () = ctx.cancelled() => return Err(caller_canceled()),
            _ = completed.wait_for(|state| state.is_some()) => {
                return Err(self.already_complete());
            }
        }

        tokio::select! {
            reply = reply_rx => match reply {
                Ok(result) => result,
                Err(_) => Err(self.already_complete()),
            },
            () = ctx.cancelled() => Err(caller_canceled()),
            _ = completed.wait_for(|state| state.is_some()) => Err(self.already_complete()),
        }
    }

    /// Block until the process completes or `ctx` fires.
    ///
    /// Returns the exit code on success; the terminal error (non-zero exit,
    /// signal kill, or deadline kill) is captured once and returned from
    /// every subsequent call.
    pub async fn wait(&self, ctx: &CancellationToken) -> Result<i32> {
        if let Some(done) = self.final_state() {
            return wait_outcome(&done);
        }

        let mut completed = self.completed.clone();
        tokio::select! {
            () = ctx.cancelled() => return Err(caller_canceled()),
            _ = completed.wait_for(|state| state.is_some()) => {}
        }
        let done = self.await_completion().await;
        wait_outcome(&done)
    }

    /// Append a completion trigger.
    ///
    /// Triggers fire exactly once, in registration order, on the reactor.
    /// Fails once the process is complete or when `ctx` has fired.
    pub async fn register_trigger<F>(&self, ctx: &CancellationToken, trigger: F) -> Result<()>
    where
        F: FnOnce(ProcessInfo) + Send + 'static,
    {
        if self.final_state().is_some() {
            return Err(self.already_complete());
        }
        if ctx.is_cancelled() {
            return Err(caller_canceled());
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ProcessRequest::RegisterTrigger {
            trigger: Box::new(trigger),
            reply: reply_tx,
        };
        let mut completed = self.completed.clone();
        tokio::select! {
            sent = self.ops.send(request) => {
                if sent.is_err() {
                    return Err(self.already_complete());
                }
            }
            () = ctx.cancelled() => return Err(caller_canceled()),
            _ = completed.wait_for(|state| state.is_some()) => {
                return Err(self.already_complete());
            }
        }

        tokio::select! {
            reply = reply_rx => match reply {
                Ok(result) => result,
                Err(_) => Err(self.already_complete()),
            },
            () = ctx.cancelled() => Err(caller_canceled()),
            _ = completed.wait_for(|state| state.is_some()) => Err(self.already_complete()),
        }
    }

    fn final_state(&self) -> Option<CompletedProcess> {
        self.completed.borrow().clone()
    }

    async fn await_completion(&self) -> CompletedProcess {
        let mut completed = self.completed.clone();
        let result = match completed.wait_for(|state| state.is_some()).await {
            Ok(guard) => guard
                .as_ref()
                .cloned()
                .unwrap_or_else(|| missing_final_state(&self.id)),
            Err(_) => missing_final_state(&self.id),
        };
        result
    }

    fn already_complete(&self) -> CoreError {
        CoreError::AlreadyComplete(format!("process '{}' has already completed", self.id))
    }
}

fn caller_canceled() -> CoreError {
    CoreError::Canceled("caller cancellation fired".to_string())
}

/// Fallback published state for a reactor that aborted without publishing.
fn missing_final_state(id: &str) -> CompletedProcess {
    CompletedProcess {
        info: ProcessInfo {
            id: id.to_string(),
            complete: true,
            ..ProcessInfo::default()
        },
        error: Some("reactor terminated without publishing a final state".to_string()),
    }
}

fn wait_outcome(done: &CompletedProcess) -> Result<i32> {
    if done.info.successful {
        return Ok(done.info.exit_code);
    }
    let reason = done
        .error
        .clone()
        .unwrap_or_else(|| format!("process exited with code {}", done.info.exit_code));
    if done.info.timeout_triggered {
        Err(CoreError::ProcessError(format!("deadline exceeded: {reason}")))
    } else {
        Err(CoreError::ProcessError(reason))
    }
}

/// Create a supervised process from the given options.
///
/// Validates the options, resolves them into a started [`LocalExecutor`]
/// bound to a child token of `cancel`, spawns the reactor task, and returns
/// the handle. Cancelling `cancel` kills the process and tears the reactor
/// down. Must be called from within a tokio runtime.
pub fn spawn_process(cancel: &CancellationToken, options: CreateOptions) -> Result<ProcessHandle> {
    validate_options(&options)?;

    let id = options
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let exec_cancel = cancel.child_token();
    let (mut exec, stdout_capture, stderr_capture) = resolve_options(&exec_cancel, &options)?;
    exec.start()?;

    let deadline = options.timeout().map(|timeout| Instant::now() + timeout);
    let snapshot = ProcessInfo {
        id: id.clone(),
        host: local_hostname(),
        pid: exec.pid(),
        is_running: true,
        complete: false,
        successful: false,
        exit_code: UNSET_EXIT_CODE,
        timeout_triggered: false,
        options,
    };

    let (ops_tx, ops_rx) = mpsc::channel(1);
    let (completed_tx, completed_rx) = watch::channel(None);

    info!("spawning reactor for process '{}' (pid {})", id, snapshot.pid);
    let reactor = ProcessReactor::new(
        snapshot,
        Box::new(exec),
        exec_cancel,
        deadline,
        ops_rx,
        completed_tx,
    );
    tokio::spawn(reactor.run());

    Ok(ProcessHandle {
        id,
        ops: ops_tx,
        completed: completed_rx,
        stdout_capture,
        stderr_capture,
    })
}

fn validate_options(options: &CreateOptions) -> Result<()> {
    if options.program().map_or(true, str::is_empty) {
        return Err(CoreError::ConfigurationError(
            "argument vector must name a program".to_string(),
        ));
    }
    for pair in &options.environment {
        if !pair.contains('=') {
            return Err(CoreError::ConfigurationError(format!(
                "malformed environment entry '{pair}'"
            )));
        }
    }
    if let Some(dir) = &options.working_directory {
        if !Path::new(dir).is_dir() {
            return Err(CoreError::ConfigurationError(format!(
                "working directory '{dir}' does not exist"
            )));
        }
    }
    Ok(())
}

/// Resolve options into an unstarted executor plus any capture buffers.
fn resolve_options(
    cancel: &CancellationToken,
    options: &CreateOptions,
) -> Result<(LocalExecutor, Option<SafeBuffer>, Option<SafeBuffer>)> {
    let mut exec = LocalExecutor::new(cancel.clone(), options.args.clone());
    exec.set_env(options.environment.clone())?;
    if let Some(dir) = &options.working_directory {
        exec.set_dir(dir.into())?;
    }
    exec.set_stdin(match &options.stdin {
        StdinSpec::Null => InputSource::Null,
        StdinSpec::Inherit => InputSource::Inherit,
        StdinSpec::Bytes(bytes) => InputSource::Bytes(bytes.clone()),
    })?;

    let (stdout_sink, stdout_capture) = resolve_output(options.stdout);
    let (stderr_sink, stderr_capture) = resolve_output(options.stderr);
    exec.set_stdout(stdout_sink)?;
    exec.set_stderr(stderr_sink)?;

    Ok((exec, stdout_capture, stderr_capture))
}

fn resolve_output(spec: OutputSpec) -> (OutputSink, Option<SafeBuffer>) {
    match spec {
        OutputSpec::Discard => (OutputSink::Discard, None),
        OutputSpec::Inherit => (OutputSink::Inherit, None),
        OutputSpec::Capture => {
            let buffer = SafeBuffer::new();
            (OutputSink::Buffer(buffer.clone()), Some(buffer))
        }
    }
}

fn local_hostname() -> String {
    nix::unistd::gethostname()
        .map(|host| host.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_args() {
        let err = validate_options(&CreateOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError(_)));
    }

    #[test]
    fn test_validate_rejects_malformed_environment() {
        let mut opts = CreateOptions::new(vec!["true"]);
        opts.environment = vec!["NOT_A_PAIR".to_string()];
        let err = validate_options(&opts).unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError(_)));
    }

    #[test]
    fn test_validate_rejects_missing_working_directory() {
        let mut opts = CreateOptions::new(vec!["true"]);
        opts.working_directory = Some("/warden/no/such/dir".to_string());
        let err = validate_options(&opts).unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError(_)));
    }

    #[test]
    fn test_resolve_allocates_capture_buffers() {
        let mut opts = CreateOptions::new(vec!["true"]);
        opts.stdout = OutputSpec::Capture;
        let cancel = CancellationToken::new();
        let (exec, stdout, stderr) = resolve_options(&cancel, &opts).unwrap();
        assert!(stdout.is_some());
        assert!(stderr.is_none());
        assert_eq!(exec.args(), ["true".to_string()]);
    }
}
