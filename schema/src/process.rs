//! Process state snapshot types
//!
//! A [`ProcessInfo`] is the externally observable state of a supervised
//! process at a single point in time. Snapshots are copied by value; once
//! `complete` is true the snapshot is final and never mutated again.

use crate::options::CreateOptions;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Exit code value used before a process has produced one, and for
/// processes terminated by a signal.
pub const UNSET_EXIT_CODE: i32 = -1;

/// PID value used before a process has been started.
pub const UNSET_PID: i32 = -1;

/// Snapshot of a supervised process's observable state
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    /// Unique identifier for the process
    pub id: String,

    /// The options the process was created with
    #[serde(default)]
    pub options: CreateOptions,

    /// Local hostname at creation time
    #[serde(default)]
    pub host: String,

    /// OS process identifier; -1 before the process has started
    pub pid: i32,

    /// Whether the process is currently running
    pub is_running: bool,

    /// Whether the process has finished and this snapshot is final
    pub complete: bool,

    /// Whether the process exited with a zero exit code
    pub successful: bool,

    /// Exit code: 0 on success, positive on failure, -1 if unset or if the
    /// process was killed by a signal
    pub exit_code: i32,

    /// Whether the configured deadline killed the process
    pub timeout_triggered: bool,
}

impl Default for ProcessInfo {
    fn default() -> Self {
        Self {
            id: String::new(),
            options: CreateOptions::default(),
            host: String::new(),
            pid: UNSET_PID,
            is_running: false,
            complete: false,
            successful: false,
            exit_code: UNSET_EXIT_CODE,
            timeout_triggered: false,
        }
    }
}

impl ProcessInfo {
    /// A zero-valued snapshot carrying only the process id.
    ///
    /// Returned by handle queries whose caller cancellation fired before the
    /// reactor could answer.
    #[must_use]
    pub fn unstarted<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}
