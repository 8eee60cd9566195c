//! Core error types

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    // ============ Process Errors ============
    #[error("failed to execute '{program}': {message}")]
    ExecutionFailed { program: String, message: String },

    #[error("'{program}' timed out after {timeout:?}")]
    ExecutionTimedOut { program: String, timeout: Duration },

    #[error("'{program}' exited with code {code}: {stderr}")]
    NonZeroExit {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("'{program}' succeeded but reported errors: {stderr}")]
    StderrReported { program: String, stderr: String },

    // ============ Archive Errors ============
    #[error("failed to extract archive into {dest}: {source}")]
    ExtractionFailed {
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive entry escapes destination: {entry}")]
    UnsafeEntryPath { entry: String },

    // ============ Configuration Errors ============
    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("cannot decode {format} output: {message}")]
    Format { format: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Stable identifier surfaced to API clients alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ExecutionFailed { .. } => "EXECUTION_FAILED",
            CoreError::ExecutionTimedOut { .. } => "EXECUTION_TIMED_OUT",
            CoreError::NonZeroExit { .. } => "NON_ZERO_EXIT",
            CoreError::StderrReported { .. } => "STDERR_REPORTED",
            CoreError::ExtractionFailed { .. } => "EXTRACTION_FAILED",
            CoreError::UnsafeEntryPath { .. } => "UNSAFE_ENTRY_PATH",
            CoreError::Config { .. } => "INVALID_CONFIG",
            CoreError::Format { .. } => "FORMAT_ERROR",
            CoreError::Io(_) => "IO_ERROR",
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        CoreError::Config {
            message: message.into(),
        }
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        CoreError::Format {
            format: "yaml".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Format {
            format: "json".to_string(),
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
