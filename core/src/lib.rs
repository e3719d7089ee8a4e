//! Core functionality for the Warden process supervision library
//!
//! This crate contains the executor, reactor, and handle layers that drive
//! a single supervised OS process per handle. Callers create a process from
//! [`schema::CreateOptions`], receive a [`process::ProcessHandle`], and
//! query or control the process through it while a dedicated reactor task
//! serializes every operation against the underlying executor.

pub mod error;
pub mod executor;
pub mod output;
#[cfg(unix)]
pub mod process;

// Re-export schema types for convenience
pub use schema::*;

pub use error::{CoreError, Result};
pub use output::{InputSource, OutputSink, SafeBuffer};
#[cfg(unix)]
pub use process::{spawn_process, ProcessHandle, ProcessTrigger};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::CoreError::ConfigurationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
