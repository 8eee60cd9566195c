//! CLI commands

pub mod cleanup;
pub mod layout;
pub mod pull;
pub mod release;
pub mod repo;
pub mod schema;
pub mod search;

use std::path::{Path, PathBuf};

use helmgate_core::Settings;
use helmgate_repo::PackageClient;
use serde::Serialize;

use crate::error::Result;

/// Settings and output mode shared by every command
pub struct Context {
    pub settings: Settings,
    pub json: bool,
}

impl Context {
    pub fn load(config: Option<&Path>, work_dir: Option<PathBuf>, json: bool) -> Result<Self> {
        let mut settings = match config {
            Some(path) => Settings::load_from(path)?,
            None => Settings::load()?,
        };
        if let Some(work_dir) = work_dir {
            settings.work_dir = work_dir;
        }
        tracing::debug!(work_dir = %settings.work_dir.display(), "settings loaded");
        Ok(Self { settings, json })
    }

    pub fn client(&self) -> PackageClient {
        PackageClient::from_settings(&self.settings)
    }

    /// Print `value` as pretty JSON
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}
