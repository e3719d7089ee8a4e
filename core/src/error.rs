//! Core error types and utilities

use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Start error: {0}")]
    StartError(String),

    #[error("Process error: {0}")]
    ProcessError(String),

    #[error("Signal error: {0}")]
    SignalError(String),

    #[error("Operation canceled: {0}")]
    Canceled(String),

    #[error("Process already complete: {0}")]
    AlreadyComplete(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "WARD001",
            CoreError::StartError(_) => "WARD002",
            CoreError::ProcessError(_) => "WARD003",
            CoreError::SignalError(_) => "WARD004",
            CoreError::Canceled(_) => "WARD005",
            CoreError::AlreadyComplete(_) => "WARD006",
            CoreError::IoError(_) => "WARD007",
        }
    }

    /// Whether this error came from a fired cancellation rather than the
    /// process itself.
    pub fn is_canceled(&self) -> bool {
        matches!(self, CoreError::Canceled(_))
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;
