//! Local executor backed by a native child process
//!
//! A [`LocalExecutor`] is bound to a cancellation token at construction.
//! If the token fires before the child exits naturally, `wait` delivers
//! SIGKILL, reaps the child, and reports the termination as a SIGKILL with
//! exit code -1 regardless of the OS-reported cause, so callers can
//! uniformly distinguish "terminated by our cancellation" from "exited on
//! its own" without decoding platform wait statuses.

use crate::error::{CoreError, Result};
use crate::executor::Executor;
use crate::output::{InputSource, OutputSink, SafeBuffer};
use async_trait::async_trait;
use nix::sys::signal::kill;
use nix::sys::signal::Signal as NixSignal;
use nix::unistd::Pid;
use schema::{Signal, UNSET_EXIT_CODE, UNSET_PID};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Final state recorded when `wait` observes termination
#[derive(Debug, Clone)]
struct ExitRecord {
    exit_code: i32,
    success: bool,
    signal: i32,
    signalled: bool,
    canceled: bool,
}

impl ExitRecord {
    fn as_result(&self) -> Result<()> {
        if self.success {
            Ok(())
        } else if self.canceled {
            Err(CoreError::Canceled(
                "process terminated by cancellation".to_string(),
            ))
        } else if self.signalled {
            Err(CoreError::ProcessError(format!(
                "process terminated by signal {}",
                self.signal
            )))
        } else {
            Err(CoreError::ProcessError(format!(
                "process exited with code {}",
                self.exit_code
            )))
        }
    }
}

/// An [`Executor`] that runs the command as a local child process
pub struct LocalExecutor {
    args: Vec<String>,
    env: Vec<String>,
    dir: Option<PathBuf>,
    stdin: InputSource,
    stdout: OutputSink,
    stderr: OutputSink,
    cancel: CancellationToken,
    child: Option<Child>,
    pid: i32,
    exit: Option<ExitRecord>,
    io_tasks: Vec<JoinHandle<()>>,
    closed: bool,
}

impl LocalExecutor {
    /// Create a local executor bound to the given cancellation token.
    ///
    /// Construction never fails; problems with the argument vector surface
    /// from `start`.
    #[must_use]
    pub fn new(cancel: CancellationToken, args: Vec<String>) -> Self {
        Self {
            args,
            env: Vec::new(),
            dir: None,
            stdin: InputSource::Null,
            stdout: OutputSink::Discard,
            stderr: OutputSink::Discard,
            cancel,
            child: None,
            pid: UNSET_PID,
            exit: None,
            io_tasks: Vec::new(),
            closed: false,
        }
    }

    fn ensure_unstarted(&self) -> Result<()> {
        if self.child.is_some() || self.exit.is_some() {
            return Err(CoreError::ConfigurationError(
                "executor is already started".to_string(),
            ));
        }
        Ok(())
    }

    /// Join the stream pump tasks so captured output is complete before
    /// `wait` returns.
    async fn drain_io(&mut self) {
        for task in self.io_tasks.drain(..) {
            let _ = task.await;
        }
    }
}

/// Spawn a task copying a child stream into a shared buffer.
fn pump<R>(mut reader: R, buffer: SafeBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => buffer.append(&chunk[..n]),
                Err(err) => {
                    debug!("output pump stopped: {}", err);
                    break;
                }
            }
        }
    })
}

fn stdio_for(sink: &OutputSink) -> Stdio {
    match sink {
        OutputSink::Discard => Stdio::null(),
        OutputSink::Inherit => Stdio::inherit(),
        OutputSink::Buffer(_) => Stdio::piped(),
    }
}

fn to_nix_signal(signal: Signal) -> NixSignal {
    match signal {
        Signal::Hangup => NixSignal::SIGHUP,
        Signal::Interrupt => NixSignal::SIGINT,
        Signal::Terminate => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    fn args(&self) -> &[String] {
        &self.args
    }

    fn env(&self) -> &[String] {
        &self.env
    }

    fn set_env(&mut self, env: Vec<String>) -> Result<()> {
        self.ensure_unstarted()?;
        self.env = env;
        Ok(())
    }

    fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn set_dir(&mut self, dir: PathBuf) -> Result<()> {
        self.ensure_unstarted()?;
        self.dir = Some(dir);
        Ok(())
    }

    fn stdin(&self) -> &InputSource {
        &self.stdin
    }

    fn set_stdin(&mut self, stdin: InputSource) -> Result<()> {
        self.ensure_unstarted()?;
        self.stdin = stdin;
        Ok(())
    }

    fn stdout(&self) -> &OutputSink {
        &self.stdout
    }

    fn set_stdout(&mut self, stdout: OutputSink) -> Result<()> {
        self.ensure_unstarted()?;
        self.stdout = stdout;
        Ok(())
    }

    fn stderr(&self) -> &OutputSink {
        &self.stderr
    }

    fn set_stderr(&mut self, stderr: OutputSink) -> Result<()> {
        self.ensure_unstarted()?;
        self.stderr = stderr;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.child.is_some() || self.exit.is_some() {
            return Err(CoreError::StartError(
                "process has already been started".to_string(),
            ));
        }
        if self.cancel.is_cancelled() {
            return Err(CoreError::Canceled(
                "cancellation fired before start".to_string(),
            ));
        }

        let program = self.args.first().ok_or_else(|| {
            CoreError::ConfigurationError("argument vector is empty".to_string())
        })?;

        let mut command = Command::new(program);
        command.args(&self.args[1..]);

        // A non-empty environment replaces the inherited one.
        if !self.env.is_empty() {
            command.env_clear();
            for pair in &self.env {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    CoreError::ConfigurationError(format!(
                        "malformed environment entry '{pair}'"
                    ))
                })?;
                command.env(key, value);
            }
        }

        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        command.stdin(match &self.stdin {
            InputSource::Null => Stdio::null(),
            InputSource::Inherit => Stdio::inherit(),
            InputSource::Bytes(_) => Stdio::piped(),
        });
        command.stdout(stdio_for(&self.stdout));
        command.stderr(stdio_for(&self.stderr));
        command.kill_on_drop(true);

        let mut child = command.spawn().map_err(|err| {
            CoreError::StartError(format!("failed to spawn '{program}': {err}"))
        })?;

        self.pid = child.id().map_or(UNSET_PID, |id| id as i32);

        if let InputSource::Bytes(bytes) = &self.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                let bytes = bytes.clone();
                self.io_tasks.push(tokio::spawn(async move {
                    if let Err(err) = stdin.write_all(&bytes).await {
                        debug!("failed to write stdin bytes: {}", err);
                    }
                    // dropping the handle closes the child's stdin
                }));
            }
        }
        if let OutputSink::Buffer(buffer) = &self.stdout {
            if let Some(out) = child.stdout.take() {
                self.io_tasks.push(pump(out, buffer.clone()));
            }
        }
        if let OutputSink::Buffer(buffer) = &self.stderr {
            if let Some(err_stream) = child.stderr.take() {
                self.io_tasks.push(pump(err_stream, buffer.clone()));
            }
        }

        self.child = Some(child);
        debug!("started process {}", self.pid);
        Ok(())
    }

    async fn wait(&mut self) -> Result<()> {
        if let Some(record) = &self.exit {
            return record.as_result();
        }
        let Some(child) = self.child.as_mut() else {
            return Err(CoreError::ProcessError(
                "process has not been started".to_string(),
            ));
        };

        let cancel = self.cancel.clone();
        let status = tokio::select! {
            status = child.wait() => Some(status?),
            () = cancel.cancelled() => None,
        };

        let record = match status {
            Some(status) => {
                let signal = status.signal();
                ExitRecord {
                    exit_code: status.code().unwrap_or(UNSET_EXIT_CODE),
                    success: status.success(),
                    signal: signal.unwrap_or(-1),
                    signalled: signal.is_some(),
                    canceled: false,
                }
            }
            None => {
                // Cancellation fired first: kill, reap, and report the
                // synthetic SIGKILL attribution.
                debug!("cancellation fired for process {}, sending SIGKILL", self.pid);
                let _ = kill(Pid::from_raw(self.pid), NixSignal::SIGKILL);
                if let Some(child) = self.child.as_mut() {
                    let _ = child.wait().await;
                }
                ExitRecord {
                    exit_code: UNSET_EXIT_CODE,
                    success: false,
                    signal: Signal::Kill.number(),
                    signalled: true,
                    canceled: true,
                }
            }
        };

        self.drain_io().await;
        let result = record.as_result();
        self.exit = Some(record);
        result
    }

    fn signal(&mut self, signal: Signal) -> Result<()> {
        if self.exit.is_some() {
            return Err(CoreError::AlreadyComplete(
                "cannot signal a terminated process".to_string(),
            ));
        }
        if self.pid <= 0 {
            return Err(CoreError::SignalError(
                "process has not been started".to_string(),
            ));
        }
        kill(Pid::from_raw(self.pid), to_nix_signal(signal)).map_err(|errno| {
            CoreError::SignalError(format!(
                "failed to deliver {} to pid {}: {}",
                signal, self.pid, errno
            ))
        })
    }

    fn pid(&self) -> i32 {
        self.pid
    }

    fn exit_code(&self) -> i32 {
        self.exit.as_ref().map_or(UNSET_EXIT_CODE, |r| r.exit_code)
    }

    fn success(&self) -> bool {
        self.exit.as_ref().is_some_and(|r| r.success)
    }

    fn signal_info(&self) -> (i32, bool) {
        match &self.exit {
            Some(record) if record.signalled => (record.signal, true),
            _ => (-1, false),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.exit.is_none() {
            if let Some(child) = self.child.as_mut() {
                if let Err(err) = child.start_kill() {
                    debug!("close: kill request failed: {}", err);
                }
            }
        }
        for task in self.io_tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }
}
