//! helmgate Repo - charts and releases through the package-manager tool
//!
//! This crate provides:
//! - `HelmTool`: command lines for the tool, bound to a working-directory layout
//! - `ArtifactCache`: download-once, extract-once chart archives keyed by `ref@version`
//! - `PackageClient`: repository, chart, release and plugin operations

pub mod cache;
pub mod client;
pub mod error;
pub mod tool;
pub mod types;

#[cfg(test)]
mod testutil;

pub use cache::{ArtifactCache, CacheKey};
pub use client::{
    NamespaceScope, PackageClient, ReleaseRequest, UpgradeOptions, validate_release_name,
};
pub use error::{RepoError, Result};
pub use tool::HelmTool;
pub use types::{
    ChartMetadata, ChartSummary, PluginEntry, ReleaseChart, ReleaseDetail, ReleaseInfo,
    ReleaseRevision, ReleaseStatus, ReleaseSummary, RepositoryEntry,
};
