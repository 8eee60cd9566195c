//! Settings file management
//!
//! Read from `~/.config/helmgate/config.yaml` unless a path is given.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::exec::{DEFAULT_TIMEOUT, PoolConfig};
use crate::layout::{DEFAULT_TEMP_MAX_AGE, Layout};

/// Process-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Root of the on-disk layout
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Package-manager executable
    #[serde(default = "default_helm_binary")]
    pub helm_binary: String,

    /// Argv prefix the executable is launched through (e.g. `[cmd, /c]`)
    #[serde(default)]
    pub helm_wrapper: Vec<String>,

    /// Timeout applied to every tool invocation
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    #[serde(default)]
    pub pool: PoolConfig,

    /// Age after which transient files are deleted
    #[serde(default = "default_temp_max_age", with = "humantime_serde")]
    pub temp_max_age: Duration,

    /// Kubeconfig handed to the tool (ambient default when unset)
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Candidate schema versions per resource kind id (`plural.group`),
    /// most preferred first
    #[serde(default)]
    pub schema_versions: IndexMap<String, Vec<String>>,
}

fn default_work_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("helmgate")
}

fn default_helm_binary() -> String {
    "helm".to_string()
}

fn default_command_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_temp_max_age() -> Duration {
    DEFAULT_TEMP_MAX_AGE
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            helm_binary: default_helm_binary(),
            helm_wrapper: Vec::new(),
            command_timeout: default_command_timeout(),
            pool: PoolConfig::default(),
            temp_max_age: default_temp_max_age(),
            kubeconfig: None,
            schema_versions: IndexMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load settings from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_yaml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("helmgate").join("config.yaml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.helm_binary.trim().is_empty() {
            return Err(CoreError::config("helmBinary must not be empty"));
        }
        if self.command_timeout.is_zero() {
            return Err(CoreError::config("commandTimeout must be greater than zero"));
        }
        if let Some((kind, _)) = self.schema_versions.iter().find(|(_, v)| v.is_empty()) {
            return Err(CoreError::config(format!(
                "schemaVersions.{kind} must list at least one version"
            )));
        }
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.work_dir)
    }

    /// Candidate versions configured for a resource kind id
    pub fn schema_candidates(&self, kind_id: &str) -> Option<&[String]> {
        self.schema_versions.get(kind_id).map(Vec::as_slice)
    }
}
