//! Error types for chart and release operations

use thiserror::Error;

use helmgate_core::CoreError;

/// Chart, release and repository operation errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Artifact Errors ============
    #[error("chart {reference}@{version} could not be downloaded: {source}")]
    ArtifactUnavailable {
        reference: String,
        version: String,
        #[source]
        source: CoreError,
    },

    #[error("chart {reference}@{version} could not be extracted: {source}")]
    ArtifactCorrupt {
        reference: String,
        version: String,
        #[source]
        source: CoreError,
    },

    // ============ Input Errors ============
    #[error("invalid chart reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("invalid release name '{name}': {reason}")]
    InvalidReleaseName { name: String, reason: String },

    // ============ Tool Errors ============
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// Stable identifier surfaced to API clients alongside the message
    ///
    /// Tool failures keep the code of the underlying command error.
    pub fn code(&self) -> &'static str {
        match self {
            RepoError::ArtifactUnavailable { .. } => "ARTIFACT_UNAVAILABLE",
            RepoError::ArtifactCorrupt { .. } => "ARTIFACT_CORRUPT",
            RepoError::InvalidReference { .. } => "INVALID_REFERENCE",
            RepoError::InvalidReleaseName { .. } => "INVALID_RELEASE_NAME",
            RepoError::Core(e) => e.code(),
            RepoError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;
