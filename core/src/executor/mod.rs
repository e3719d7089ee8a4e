//! Executor abstraction over OS process primitives
//!
//! An [`Executor`] wraps a single command invocation with a
//! lifecycle-typed interface: configuration before `start`, control and
//! introspection afterwards. Exactly one reactor owns an executor after
//! `start`; all post-start access is serialized there.
//!
//! The only backend in this crate is [`LocalExecutor`], which runs the
//! command as a native child process. The trait is the seam where other
//! backends would plug in.

use crate::output::{InputSource, OutputSink};
use crate::Result;
use async_trait::async_trait;
use schema::Signal;
use std::path::{Path, PathBuf};

#[cfg(unix)]
pub mod local;

#[cfg(unix)]
pub use local::LocalExecutor;

/// A lifecycle-typed wrapper around one OS command invocation
#[async_trait]
pub trait Executor: Send {
    /// The argument vector; the first element is the program.
    fn args(&self) -> &[String];

    /// The configured environment as ordered `KEY=VALUE` pairs.
    fn env(&self) -> &[String];

    /// Replace the environment. Valid only before `start`.
    fn set_env(&mut self, env: Vec<String>) -> Result<()>;

    /// The configured working directory.
    fn dir(&self) -> Option<&Path>;

    /// Set the working directory. Valid only before `start`.
    fn set_dir(&mut self, dir: PathBuf) -> Result<()>;

    /// The configured standard input source.
    fn stdin(&self) -> &InputSource;

    /// Set the standard input source. Valid only before `start`.
    fn set_stdin(&mut self, stdin: InputSource) -> Result<()>;

    /// The configured standard output sink.
    fn stdout(&self) -> &OutputSink;

    /// Set the standard output sink. Valid only before `start`.
    fn set_stdout(&mut self, stdout: OutputSink) -> Result<()>;

    /// The configured standard error sink.
    fn stderr(&self) -> &OutputSink;

    /// Set the standard error sink. Valid only before `start`.
    fn set_stderr(&mut self, stderr: OutputSink) -> Result<()>;

    /// Launch the child process.
    ///
    /// Fails when the bound cancellation already fired, when the binary
    /// cannot be located or executed, or when `start` was already called.
    fn start(&mut self) -> Result<()>;

    /// Block until the child terminates or the bound cancellation fires,
    /// whichever is sooner.
    ///
    /// Fails for an unstarted process, a non-zero exit, or a cancellation
    /// that fired before natural exit. Cancellation-induced termination is
    /// reported as a SIGKILL in `signal_info` with exit code -1, regardless
    /// of the OS-reported cause.
    async fn wait(&mut self) -> Result<()>;

    /// Deliver a signal to the child.
    ///
    /// Fails for an unstarted or already-terminated process.
    fn signal(&mut self, signal: Signal) -> Result<()>;

    /// OS process identifier; -1 before `start`.
    fn pid(&self) -> i32;

    /// Final exit code: -1 before termination and for signal kills, 0 on
    /// success, positive otherwise.
    fn exit_code(&self) -> i32;

    /// Whether `wait` observed a zero exit code.
    fn success(&self) -> bool;

    /// The terminating signal number and whether the process was signalled.
    /// `(-1, false)` when no signal terminated the process.
    fn signal_info(&self) -> (i32, bool);

    /// Release executor-held resources. Tolerates repeated calls and a
    /// fired cancellation.
    fn close(&mut self) -> Result<()>;
}
