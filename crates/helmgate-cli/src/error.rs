//! CLI error type with exit code handling
//!
//! Library errors are carried unchanged; their stable code becomes the
//! diagnostic code and selects the process exit code.

use std::fmt;

use helmgate_core::CoreError;
use helmgate_kube::KubeError;
use helmgate_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Kube(#[from] KubeError),

    /// Invalid command line input
    #[error("{message}")]
    Input {
        message: String,
        help: Option<String>,
    },

    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Stable identifier of the underlying failure
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Core(e) => e.code(),
            CliError::Repo(e) => e.code(),
            CliError::Kube(e) => e.code(),
            CliError::Input { .. } => "INVALID_INPUT",
            CliError::Output(_) => "FORMAT_ERROR",
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self.code() {
            "EXECUTION_FAILED" | "NON_ZERO_EXIT" | "STDERR_REPORTED" => exit_codes::TOOL_ERROR,
            "EXECUTION_TIMED_OUT" => exit_codes::TIMEOUT,
            "ARTIFACT_UNAVAILABLE" | "ARTIFACT_CORRUPT" | "EXTRACTION_FAILED"
            | "UNSAFE_ENTRY_PATH" => exit_codes::ARTIFACT_ERROR,
            "UNSUPPORTED_SCHEMA" | "KUBE_API_ERROR" => exit_codes::CLUSTER_ERROR,
            "IO_ERROR" => exit_codes::IO_ERROR,
            "INVALID_CONFIG" => exit_codes::CONFIG_ERROR,
            "INVALID_INPUT" | "INVALID_REFERENCE" | "INVALID_RELEASE_NAME" => {
                exit_codes::USAGE_ERROR
            }
            _ => exit_codes::ERROR,
        }
    }
}

impl Diagnostic for CliError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(CliError::code(self)))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            CliError::Input {
                help: Some(help), ..
            } => Some(Box::new(help)),
            CliError::Repo(RepoError::ArtifactUnavailable { .. }) => Some(Box::new(
                "Check the chart reference and version, or retry with --refresh",
            )),
            CliError::Kube(KubeError::UnsupportedSchema { .. }) => Some(Box::new(
                "Is the resource definition installed in the cluster?",
            )),
            _ => None,
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
