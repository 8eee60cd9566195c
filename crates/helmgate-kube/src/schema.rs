//! Schema version resolution
//!
//! Custom resources are often served under several API versions, and which
//! ones a cluster accepts depends on what is installed there. The resolver
//! probes candidate versions in preference order and remembers the first one
//! the cluster accepts, once per resource kind for the life of the process.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use helmgate_core::Settings;
use kube::{
    Client, Config,
    api::{Api, DynamicObject, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::GroupVersionKind,
    discovery::ApiResource,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{KubeError, Result};

/// A resource type whose served version is to be resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKind {
    /// API group, e.g. `cert-manager.io` (empty for the core group)
    pub group: String,
    /// Kind, e.g. `Certificate`
    pub kind: String,
    /// Plural resource name, e.g. `certificates`
    pub plural: String,
    /// Probe inside this namespace instead of cluster-wide
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceKind {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            plural: plural.into(),
            namespace: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// `plural.group`, the key for cached and configured versions
    ///
    /// Core group kinds are identified by the plural alone.
    pub fn id(&self) -> String {
        if self.group.is_empty() {
            self.plural.clone()
        } else {
            format!("{}.{}", self.plural, self.group)
        }
    }
}

/// Existence check for one version of a resource kind
#[async_trait]
pub trait SchemaProbe: Send + Sync {
    /// Succeeds when the cluster serves `kind` under `version`
    async fn probe(&self, kind: &ResourceKind, version: &str) -> Result<()>;
}

/// Probe backed by a live cluster: a single-item list call
#[derive(Clone)]
pub struct ClusterProbe {
    client: Client,
}

impl ClusterProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client from an explicit kubeconfig file, or the inferred default
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig =
                    Kubeconfig::read_from(path).map_err(|e| KubeError::Config(e.to_string()))?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| KubeError::Config(e.to_string()))?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };
        Ok(Self::new(client))
    }
}

#[async_trait]
impl SchemaProbe for ClusterProbe {
    async fn probe(&self, kind: &ResourceKind, version: &str) -> Result<()> {
        let gvk = GroupVersionKind::gvk(&kind.group, version, &kind.kind);
        let ar = ApiResource::from_gvk_with_plural(&gvk, &kind.plural);
        let api: Api<DynamicObject> = match &kind.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };
        api.list(&ListParams::default().limit(1)).await?;
        Ok(())
    }
}

/// Finds and remembers the first candidate version the cluster accepts
pub struct SchemaVersionResolver<P = ClusterProbe> {
    probe: P,
    resolved: Mutex<HashMap<String, String>>,
}

impl<P: SchemaProbe> SchemaVersionResolver<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// First version in `candidates` served by the cluster
    ///
    /// A previously resolved version is returned without probing. Probes run
    /// one at a time in the given order and stop at the first success. When
    /// every candidate fails nothing is cached, so a later call probes again.
    pub async fn resolve<S: AsRef<str>>(
        &self,
        kind: &ResourceKind,
        candidates: &[S],
    ) -> Result<String> {
        let id = kind.id();
        let mut resolved = self.resolved.lock().await;
        if let Some(version) = resolved.get(&id) {
            return Ok(version.clone());
        }

        for candidate in candidates {
            let version = candidate.as_ref();
            match self.probe.probe(kind, version).await {
                Ok(()) => {
                    tracing::info!(kind = %id, version, "resolved schema version");
                    resolved.insert(id, version.to_string());
                    return Ok(version.to_string());
                }
                Err(e) => {
                    tracing::debug!(kind = %id, version, error = %e, "schema version rejected");
                }
            }
        }

        Err(KubeError::UnsupportedSchema {
            kind: id,
            tried: candidates.iter().map(|c| c.as_ref().to_string()).collect(),
        })
    }

    /// Resolve using the candidates configured for this kind
    pub async fn resolve_configured(&self, kind: &ResourceKind, settings: &Settings) -> Result<String> {
        let id = kind.id();
        match settings.schema_candidates(&id) {
            Some(candidates) => self.resolve(kind, candidates).await,
            None => Err(KubeError::NotConfigured { kind: id }),
        }
    }

    /// Version cached for `kind`, if any
    pub async fn cached(&self, kind: &ResourceKind) -> Option<String> {
        self.resolved.lock().await.get(&kind.id()).cloned()
    }

    /// Forget the cached version, e.g. after the cluster stopped serving it
    pub async fn invalidate(&self, kind: &ResourceKind) -> Option<String> {
        self.resolved.lock().await.remove(&kind.id())
    }
}
