//! Process creation options
//!
//! This module defines the record consumed when creating a supervised
//! process: argv, environment, working directory, standard stream bindings,
//! and the optional execution deadline.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Binding for a child process's standard input
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StdinSpec {
    /// No input; the child reads EOF immediately
    Null,
    /// Inherit the parent's standard input
    Inherit,
    /// Feed the given bytes to the child, then close the stream
    Bytes(Vec<u8>),
}

impl Default for StdinSpec {
    fn default() -> Self {
        StdinSpec::Null
    }
}

/// Binding for a child process's standard output or standard error
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OutputSpec {
    /// Drop the stream's output
    Discard,
    /// Inherit the parent's stream
    Inherit,
    /// Capture the stream into a shared buffer readable from the handle
    Capture,
}

impl Default for OutputSpec {
    fn default() -> Self {
        OutputSpec::Discard
    }
}

/// Complete specification for creating a supervised process
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateOptions {
    /// Unique identifier for the process; generated when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Argument vector; the first element is the program
    pub args: Vec<String>,

    /// Ordered `KEY=VALUE` pairs; an empty list inherits the parent's
    /// environment, a non-empty list replaces it
    #[serde(default)]
    pub environment: Vec<String>,

    /// Working directory for the process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,

    /// Standard input binding
    #[serde(default)]
    pub stdin: StdinSpec,

    /// Standard output binding
    #[serde(default)]
    pub stdout: OutputSpec,

    /// Standard error binding
    #[serde(default)]
    pub stderr: OutputSpec,

    /// Execution deadline in seconds; 0 means no deadline
    #[serde(default)]
    pub timeout_secs: u64,
}

impl CreateOptions {
    /// Create options for the given argument vector with default bindings.
    #[must_use]
    pub fn new<S: Into<String>>(args: Vec<S>) -> Self {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// The program to execute, if any arguments were supplied.
    #[must_use]
    pub fn program(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Get the execution deadline as a Duration, if one is configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}
