//! Error types for helmgate-kube

use thiserror::Error;

/// Result type for helmgate-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while talking to the cluster API
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// No candidate schema version was accepted by the cluster
    #[error("no supported schema version for {kind} (tried: {})", tried.join(", "))]
    UnsupportedSchema { kind: String, tried: Vec<String> },

    /// Resource kind has no configured candidate versions
    #[error("no schema versions configured for {kind}")]
    NotConfigured { kind: String },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Client configuration could not be loaded
    #[error("kubeconfig error: {0}")]
    Config(String),
}

impl KubeError {
    /// Stable identifier surfaced to API clients alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            KubeError::UnsupportedSchema { .. } => "UNSUPPORTED_SCHEMA",
            KubeError::NotConfigured { .. } => "INVALID_CONFIG",
            KubeError::Api(_) => "KUBE_API_ERROR",
            KubeError::Config(_) => "INVALID_CONFIG",
        }
    }
}
