//! Records decoded from the tool's structured output

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// A configured chart repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    pub name: String,
    pub url: String,
}

/// One row of a repository search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSummary {
    /// `repo/name`
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub description: String,
}

/// Chart.yaml contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub chart_type: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Release lifecycle status as reported by the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    Deployed,
    Uninstalled,
    Superseded,
    Failed,
    Uninstalling,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
    #[serde(other)]
    Unknown,
}

impl ReleaseStatus {
    /// An operation is still in flight
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ReleaseStatus::PendingInstall
                | ReleaseStatus::PendingUpgrade
                | ReleaseStatus::PendingRollback
                | ReleaseStatus::Uninstalling
        )
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReleaseStatus::Deployed => "deployed",
            ReleaseStatus::Uninstalled => "uninstalled",
            ReleaseStatus::Superseded => "superseded",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::Uninstalling => "uninstalling",
            ReleaseStatus::PendingInstall => "pending-install",
            ReleaseStatus::PendingUpgrade => "pending-upgrade",
            ReleaseStatus::PendingRollback => "pending-rollback",
            ReleaseStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One row of a release listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub name: String,
    pub namespace: String,
    #[serde(deserialize_with = "revision")]
    pub revision: u32,
    #[serde(default)]
    pub updated: String,
    pub status: ReleaseStatus,
    /// `<chart>-<version>`
    pub chart: String,
    #[serde(default)]
    pub app_version: String,
}

/// One revision of a release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRevision {
    #[serde(deserialize_with = "revision")]
    pub revision: u32,
    #[serde(default)]
    pub updated: String,
    pub status: ReleaseStatus,
    pub chart: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub first_deployed: Option<String>,
    #[serde(default)]
    pub last_deployed: Option<String>,
    #[serde(default)]
    pub description: String,
    pub status: ReleaseStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseChart {
    pub metadata: ChartMetadata,
}

/// Full release record (status, install and upgrade output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseDetail {
    pub name: String,
    pub namespace: String,
    #[serde(deserialize_with = "revision")]
    pub version: u32,
    pub info: ReleaseInfo,
    #[serde(default)]
    pub chart: Option<ReleaseChart>,
    /// User-supplied values
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub manifest: Option<String>,
}

/// An installed tool plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl PluginEntry {
    /// Parse the plain-text plugin table (`NAME  VERSION  DESCRIPTION`)
    pub fn parse_table(text: &str) -> Vec<PluginEntry> {
        text.lines()
            .skip_while(|l| !l.trim_start().starts_with("NAME"))
            .skip(1)
            .filter_map(|line| {
                let mut cols = line.split('\t').map(str::trim).filter(|c| !c.is_empty());
                let name = cols.next()?;
                let version = cols.next().unwrap_or_default();
                let description = cols.collect::<Vec<_>>().join(" ");
                Some(PluginEntry {
                    name: name.to_string(),
                    version: version.to_string(),
                    description,
                })
            })
            .collect()
    }
}

/// Revisions are strings in listings and numbers elsewhere
fn revision<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Revision {
        Number(u32),
        Text(String),
    }

    match Revision::deserialize(deserializer)? {
        Revision::Number(n) => Ok(n),
        Revision::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
