//! Local chart artifact cache
//!
//! Downloaded archives live at `downloads/<reference>/<name>-<version>.tgz`, extracted
//! charts at `charts/<reference>/<version>/<name>/`. Both are written once
//! and never modified afterwards: archives are pulled into a staging
//! directory and renamed into place, and charts are extracted into a staging
//! directory whose top-level chart directory is renamed into place only after
//! a complete extraction. Concurrent first requests for the same key are
//! serialized by an in-process lock per key.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use helmgate_core::{CoreError, archive};
use tempfile::TempDir;

use crate::error::{RepoError, Result};
use crate::tool::HelmTool;

/// Identity of a downloaded chart artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    reference: String,
    version: String,
}

impl CacheKey {
    /// `reference` is `repo/name`, a bare `name`, or an `oci://` URL
    pub fn new(reference: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let reference = reference.into();
        let version = version.into();

        let invalid = |reason: &str| RepoError::InvalidReference {
            reference: reference.clone(),
            reason: reason.to_string(),
        };

        let segments: Vec<&str> = reference_segments(&reference).collect();
        if segments.is_empty() {
            return Err(invalid("reference is empty"));
        }
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(invalid("reference must not contain relative segments"));
        }
        if version.trim().is_empty() {
            return Err(invalid("version is empty"));
        }
        if version.contains(['/', '\\']) || version == "." || version == ".." {
            return Err(invalid("version must be a single path segment"));
        }

        Ok(Self { reference, version })
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Chart name: last segment of the reference
    pub fn name(&self) -> &str {
        reference_segments(&self.reference)
            .last()
            .unwrap_or(&self.reference)
    }

    /// Repository part of a `repo/name` reference
    pub fn repository(&self) -> Option<&str> {
        if self.reference.contains("://") {
            return None;
        }
        self.reference.split_once('/').map(|(repo, _)| repo)
    }

    pub fn archive_file_name(&self) -> String {
        format!("{}-{}.tgz", self.name(), self.version)
    }

    fn reference_path(&self) -> PathBuf {
        reference_segments(&self.reference).collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.reference, self.version)
    }
}

fn reference_segments(reference: &str) -> impl Iterator<Item = &str> {
    let stripped = reference
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(reference);
    stripped.split('/').filter(|s| !s.is_empty())
}

/// On-disk cache of chart archives and their extracted trees
pub struct ArtifactCache {
    tool: HelmTool,
    locks: Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ArtifactCache {
    pub fn new(tool: HelmTool) -> Self {
        Self {
            tool,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn tool(&self) -> &HelmTool {
        &self.tool
    }

    /// Where the archive for `key` is stored
    pub fn archive_path(&self, key: &CacheKey) -> PathBuf {
        self.tool
            .layout()
            .downloads_dir()
            .join(key.reference_path())
            .join(key.archive_file_name())
    }

    /// Where the extracted chart for `key` is stored
    pub fn extract_dir(&self, key: &CacheKey) -> PathBuf {
        self.version_dir(key).join(key.name())
    }

    fn version_dir(&self, key: &CacheKey) -> PathBuf {
        self.tool
            .layout()
            .charts_dir()
            .join(key.reference_path())
            .join(&key.version)
    }

    /// Return the local archive for `key`, pulling it first if absent
    ///
    /// With `refresh`, the chart's repository index is updated before a pull.
    pub async fn ensure_downloaded(&self, key: &CacheKey, refresh: bool) -> Result<PathBuf> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;
        self.download_locked(key, refresh).await
    }

    /// Return the extracted chart directory for `key`, downloading and
    /// extracting as needed
    pub async fn ensure_extracted(&self, key: &CacheKey, refresh: bool) -> Result<PathBuf> {
        let dir = self.extract_dir(key);
        if dir.is_dir() {
            return Ok(dir);
        }

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        // Another caller may have finished while we waited
        if dir.is_dir() {
            return Ok(dir);
        }

        let archive_path = self.download_locked(key, refresh).await?;
        let version_dir = self.version_dir(key);

        let corrupt = |source: CoreError| RepoError::ArtifactCorrupt {
            reference: key.reference.clone(),
            version: key.version.clone(),
            source,
        };

        std::fs::create_dir_all(&version_dir).map_err(|e| corrupt(e.into()))?;
        let staging = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(&version_dir)
            .map_err(|e| corrupt(e.into()))?;

        let staging_path = staging.path().to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || {
            archive::extract_file(&archive_path, &staging_path, false)
        })
        .await
        .map_err(|e| corrupt(CoreError::Io(std::io::Error::other(e))))?;

        if let Err(e) = extracted {
            discard(staging, &version_dir);
            return Err(corrupt(e));
        }

        let chart_root = staging.path().join(key.name());
        if !chart_root.is_dir() {
            discard(staging, &version_dir);
            return Err(corrupt(CoreError::ExtractionFailed {
                dest: dir,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("archive has no top-level '{}' directory", key.name()),
                ),
            }));
        }

        if let Err(e) = std::fs::rename(&chart_root, &dir) {
            // Lost a race with another process writing the same tree
            if !dir.is_dir() {
                discard(staging, &version_dir);
                return Err(corrupt(e.into()));
            }
        }
        drop(staging);

        tracing::info!(chart = %key, path = %dir.display(), "extracted chart");
        Ok(dir)
    }

    /// Remove the cached archive and extracted tree for `key`
    pub async fn evict(&self, key: &CacheKey) -> Result<()> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        remove_if_exists(&self.archive_path(key), false)?;
        remove_if_exists(&self.version_dir(key), true)?;
        tracing::info!(chart = %key, "evicted chart from cache");
        Ok(())
    }

    async fn download_locked(&self, key: &CacheKey, refresh: bool) -> Result<PathBuf> {
        let path = self.archive_path(key);
        if path.is_file() {
            return Ok(path);
        }

        let unavailable = |source: CoreError| RepoError::ArtifactUnavailable {
            reference: key.reference.clone(),
            version: key.version.clone(),
            source,
        };

        if refresh {
            if let Some(repo) = key.repository() {
                let spec = self.tool.command(["repo", "update", repo]);
                self.tool.run(&spec).await.map_err(|e| match e {
                    RepoError::Core(core) => unavailable(core),
                    other => other,
                })?;
            }
        }

        let archive_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.tool.layout().downloads_dir());
        std::fs::create_dir_all(&archive_dir).map_err(|e| unavailable(e.into()))?;
        let staging = tempfile::Builder::new()
            .prefix(".pull-")
            .tempdir_in(&archive_dir)
            .map_err(|e| unavailable(e.into()))?;

        let spec = self.tool.command([
            "pull".to_string(),
            key.reference.clone(),
            "--version".to_string(),
            key.version.clone(),
            "--destination".to_string(),
            staging.path().to_string_lossy().into_owned(),
        ]);
        self.tool.run(&spec).await.map_err(|e| match e {
            RepoError::Core(core) => unavailable(core),
            other => other,
        })?;

        let pulled = staging.path().join(key.archive_file_name());
        if !pulled.is_file() {
            return Err(unavailable(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("pull did not produce {}", key.archive_file_name()),
            ))));
        }
        std::fs::rename(&pulled, &path).map_err(|e| unavailable(e.into()))?;

        tracing::info!(chart = %key, path = %path.display(), "downloaded chart");
        Ok(path)
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }
}

/// Drop a failed staging directory and the version directory if it is now empty
fn discard(staging: TempDir, version_dir: &Path) {
    if let Err(e) = staging.close() {
        tracing::warn!(path = %version_dir.display(), "failed to remove extraction staging: {}", e);
    }
    // Only succeeds when empty
    let _ = std::fs::remove_dir(version_dir);
}

fn remove_if_exists(path: &Path, dir: bool) -> std::io::Result<()> {
    let result = if dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
