//! On-disk working directory layout
//!
//! ```text
//! <root>/
//!   cache/      tool cache home
//!   config/     tool config home (repositories.yaml lives here)
//!   data/       tool data home
//!   plugins/    installed tool plugins
//!   downloads/  <name>-<version>.tgz
//!   charts/     <reference>/<version>/<name>/...
//!   tmp/        transient files, removed after a few days
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::error::Result;

/// Age after which files in `tmp/` are removed
pub const DEFAULT_TEMP_MAX_AGE: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Directory layout rooted at a single working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_home(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn config_home(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn data_home(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn charts_dir(&self) -> PathBuf {
        self.root.join("charts")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    fn all_dirs(&self) -> [PathBuf; 7] {
        [
            self.cache_home(),
            self.config_home(),
            self.data_home(),
            self.plugins_dir(),
            self.downloads_dir(),
            self.charts_dir(),
            self.temp_dir(),
        ]
    }

    /// Create every directory of the layout
    pub fn ensure(&self) -> Result<()> {
        for dir in self.all_dirs() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Environment that confines the package-manager tool to this layout
    pub fn helm_env(&self) -> Vec<(String, String)> {
        let path = |p: PathBuf| p.to_string_lossy().into_owned();
        vec![
            ("HELM_CACHE_HOME".to_string(), path(self.cache_home())),
            ("HELM_CONFIG_HOME".to_string(), path(self.config_home())),
            ("HELM_DATA_HOME".to_string(), path(self.data_home())),
            ("HELM_PLUGINS".to_string(), path(self.plugins_dir())),
            (
                "HELM_REPOSITORY_CONFIG".to_string(),
                path(self.config_home().join("repositories.yaml")),
            ),
            (
                "HELM_REPOSITORY_CACHE".to_string(),
                path(self.cache_home().join("repository")),
            ),
        ]
    }

    /// Write `contents` to a file under `tmp/` that is deleted on drop
    pub fn temp_file(&self, prefix: &str, contents: &[u8]) -> Result<NamedTempFile> {
        let dir = self.temp_dir();
        std::fs::create_dir_all(&dir)?;
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".yaml")
            .tempfile_in(dir)?;
        file.write_all(contents)?;
        file.flush()?;
        Ok(file)
    }

    /// Remove files in `tmp/` last modified more than `max_age` ago
    ///
    /// Best effort: failures are logged and skipped. Returns the number of
    /// files removed.
    pub fn cleanup_temp(&self, max_age: Duration) -> usize {
        let dir = self.temp_dir();
        if !dir.exists() {
            return 0;
        }

        let now = SystemTime::now();
        let mut removed = 0;

        for entry in WalkDir::new(&dir).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("temp cleanup: cannot read entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let modified = match entry
                .metadata()
                .map_err(std::io::Error::from)
                .and_then(|m| m.modified())
            {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), "temp cleanup: {}", e);
                    continue;
                }
            };

            // Files from the future are left alone
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), "temp cleanup: {}", e);
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "removed stale temp files");
        }
        removed
    }
}
