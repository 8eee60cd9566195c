//! Package-manager client
//!
//! Chart, release, repository and plugin operations, each one a single tool
//! invocation. Structured output is requested as JSON where the tool offers
//! it and decoded through the client's format registry.

use std::path::PathBuf;
use std::time::Duration;

use helmgate_core::{CoreError, FormatRegistry, Settings};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::cache::{ArtifactCache, CacheKey};
use crate::error::{RepoError, Result};
use crate::tool::HelmTool;
use crate::types::{
    ChartMetadata, ChartSummary, PluginEntry, ReleaseDetail, ReleaseRevision, ReleaseSummary,
    RepositoryEntry,
};

/// Release names become resource labels, so they must be DNS-1123 labels
static RELEASE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));

const MAX_RELEASE_NAME_LEN: usize = 53;

/// Slack added on top of the tool's own `--timeout` for our process timeout
const WAIT_MARGIN: Duration = Duration::from_secs(30);

/// Which namespaces a release listing covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceScope {
    All,
    Namespace(String),
}

/// Parameters shared by install and upgrade
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub name: String,
    pub namespace: String,
    pub chart: CacheKey,
    /// Values overriding the chart defaults
    pub values: Option<serde_json::Value>,
    pub create_namespace: bool,
    /// Wait for resources to become ready, bounded by this duration
    pub wait: Option<Duration>,
    /// Refresh the chart repository before a cache miss pull
    pub refresh: bool,
}

impl ReleaseRequest {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, chart: CacheKey) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            chart,
            values: None,
            create_namespace: false,
            wait: None,
            refresh: false,
        }
    }

    pub fn values(mut self, values: serde_json::Value) -> Self {
        self.values = Some(values);
        self
    }

    pub fn create_namespace(mut self, create: bool) -> Self {
        self.create_namespace = create;
        self
    }

    pub fn wait(mut self, timeout: Duration) -> Self {
        self.wait = Some(timeout);
        self
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

/// Upgrade-only switches
#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    /// Install when the release does not exist yet
    pub install: bool,
    /// Merge with the values of the previous revision
    pub reuse_values: bool,
    /// Roll back automatically on failure
    pub atomic: bool,
}

/// High-level client for the package-manager tool
pub struct PackageClient {
    tool: HelmTool,
    cache: ArtifactCache,
    formats: FormatRegistry,
}

impl PackageClient {
    pub fn new(tool: HelmTool) -> Self {
        Self {
            cache: ArtifactCache::new(tool.clone()),
            tool,
            formats: FormatRegistry::with_defaults(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(HelmTool::from_settings(settings))
    }

    /// Replace the output decoders
    pub fn with_formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = formats;
        self
    }

    pub fn tool(&self) -> &HelmTool {
        &self.tool
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    // ========== Tool ==========

    /// Version string of the tool
    pub async fn version(&self) -> Result<String> {
        self.text(["version", "--short"]).await
    }

    // ========== Repositories ==========

    pub async fn repo_add(&self, name: &str, url: &str) -> Result<()> {
        self.text(["repo", "add", name, url, "--force-update"])
            .await
            .map(drop)
    }

    pub async fn repo_remove(&self, name: &str) -> Result<()> {
        self.text(["repo", "remove", name]).await.map(drop)
    }

    pub async fn repo_list(&self) -> Result<Vec<RepositoryEntry>> {
        match self.json(["repo", "list"]).await {
            // The tool reports an empty configuration as an error
            Err(RepoError::Core(CoreError::NonZeroExit { stderr, .. }))
                if stderr.contains("no repositories") =>
            {
                Ok(Vec::new())
            }
            other => other,
        }
    }

    pub async fn repo_update(&self) -> Result<()> {
        self.text(["repo", "update"]).await.map(drop)
    }

    // ========== Charts ==========

    /// Search configured repositories by keyword
    pub async fn search(&self, keyword: &str, all_versions: bool) -> Result<Vec<ChartSummary>> {
        let mut args = vec!["search", "repo", keyword];
        if all_versions {
            args.push("--versions");
        }
        self.json(args).await
    }

    /// All published versions of `reference` (`repo/name`), newest first
    pub async fn chart_versions(&self, reference: &str) -> Result<Vec<ChartSummary>> {
        // Anchored so `nginx` does not also match `nginx-ingress`
        let pattern = format!("^{}$", regex::escape(reference));
        let mut charts: Vec<ChartSummary> = self
            .json(["search", "repo", "--regexp", pattern.as_str(), "--versions"])
            .await?;
        sort_by_version_desc(&mut charts);
        Ok(charts)
    }

    /// Default values of a chart, as YAML text
    pub async fn show_values(&self, key: &CacheKey) -> Result<String> {
        let archive = self.cache.ensure_downloaded(key, false).await?;
        self.text(["show".to_string(), "values".to_string(), path_arg(&archive)])
            .await
    }

    /// Chart.yaml of a chart
    pub async fn show_chart(&self, key: &CacheKey) -> Result<ChartMetadata> {
        let archive = self.cache.ensure_downloaded(key, false).await?;
        let text = self
            .text(["show".to_string(), "chart".to_string(), path_arg(&archive)])
            .await?;
        Ok(self.formats.decode("yaml", &text)?)
    }

    /// Local archive of a chart
    pub async fn pull(&self, key: &CacheKey, refresh: bool) -> Result<PathBuf> {
        self.cache.ensure_downloaded(key, refresh).await
    }

    /// Extracted chart directory
    pub async fn pull_extracted(&self, key: &CacheKey, refresh: bool) -> Result<PathBuf> {
        self.cache.ensure_extracted(key, refresh).await
    }

    // ========== Releases ==========

    pub async fn list_releases(&self, scope: &NamespaceScope) -> Result<Vec<ReleaseSummary>> {
        let mut args = vec!["list".to_string(), "--all".to_string()];
        args.extend(scope_args(scope));
        self.json(args).await
    }

    pub async fn release_status(&self, name: &str, namespace: &str) -> Result<ReleaseDetail> {
        validate_release_name(name)?;
        self.json(["status", name, "--namespace", namespace]).await
    }

    pub async fn release_history(&self, name: &str, namespace: &str) -> Result<Vec<ReleaseRevision>> {
        validate_release_name(name)?;
        self.json(["history", name, "--namespace", namespace]).await
    }

    /// User-supplied values of the current revision (`None` when there are none)
    pub async fn release_values(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<serde_json::Value>> {
        validate_release_name(name)?;
        self.json(["get", "values", name, "--namespace", namespace])
            .await
    }

    /// Rendered manifest of the current revision
    pub async fn release_manifest(&self, name: &str, namespace: &str) -> Result<String> {
        validate_release_name(name)?;
        self.text(["get", "manifest", name, "--namespace", namespace])
            .await
    }

    pub async fn install(&self, request: &ReleaseRequest) -> Result<ReleaseDetail> {
        self.deploy("install", request, &UpgradeOptions::default())
            .await
    }

    pub async fn upgrade(
        &self,
        request: &ReleaseRequest,
        options: &UpgradeOptions,
    ) -> Result<ReleaseDetail> {
        self.deploy("upgrade", request, options).await
    }

    pub async fn uninstall(&self, name: &str, namespace: &str) -> Result<()> {
        validate_release_name(name)?;
        self.text(["uninstall", name, "--namespace", namespace])
            .await
            .map(drop)
    }

    /// Roll back to `revision`, or to the previous one when `None`
    pub async fn rollback(&self, name: &str, namespace: &str, revision: Option<u32>) -> Result<()> {
        validate_release_name(name)?;
        let mut args = vec!["rollback".to_string(), name.to_string()];
        if let Some(revision) = revision {
            args.push(revision.to_string());
        }
        args.extend(["--namespace".to_string(), namespace.to_string()]);
        self.text(args).await.map(drop)
    }

    // ========== Plugins ==========

    pub async fn plugin_list(&self) -> Result<Vec<PluginEntry>> {
        let text = self.text(["plugin", "list"]).await?;
        Ok(PluginEntry::parse_table(&text))
    }

    // ========== Internals ==========

    async fn deploy(
        &self,
        action: &str,
        request: &ReleaseRequest,
        options: &UpgradeOptions,
    ) -> Result<ReleaseDetail> {
        validate_release_name(&request.name)?;

        let archive = self
            .cache
            .ensure_downloaded(&request.chart, request.refresh)
            .await?;

        let mut args = vec![
            action.to_string(),
            request.name.clone(),
            path_arg(&archive),
            "--namespace".to_string(),
            request.namespace.clone(),
        ];
        if request.create_namespace {
            args.push("--create-namespace".to_string());
        }
        if options.install {
            args.push("--install".to_string());
        }
        if options.reuse_values {
            args.push("--reuse-values".to_string());
        }
        if options.atomic {
            args.push("--atomic".to_string());
        }

        // Kept alive until the command finishes
        let values_file = match &request.values {
            Some(values) => {
                let yaml = serde_yaml::to_string(values).map_err(CoreError::from)?;
                Some(self.tool.layout().temp_file("values-", yaml.as_bytes())?)
            }
            None => None,
        };
        if let Some(file) = &values_file {
            args.push("--values".to_string());
            args.push(path_arg(file.path()));
        }

        let mut spec = self.tool.command(args.iter().cloned().chain(output_args("json")));
        if let Some(wait) = request.wait {
            spec = spec
                .args([
                    "--wait".to_string(),
                    "--timeout".to_string(),
                    format!("{}s", wait.as_secs().max(1)),
                ])
                .timeout(wait + WAIT_MARGIN);
        }

        let result = self.tool.run(&spec).await?;
        tracing::info!(
            release = %request.name,
            namespace = %request.namespace,
            chart = %request.chart,
            "{} finished", action
        );
        Ok(self.formats.decode("json", &result.stdout)?)
    }

    async fn text<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = self.tool.command(args);
        Ok(self.tool.run(&spec).await?.stdout)
    }

    async fn json<T, I, S>(&self, args: I) -> Result<T>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let spec = self.tool.command(args.into_iter().chain(output_args("json")));
        let result = self.tool.run(&spec).await?;
        Ok(self.formats.decode("json", &result.stdout)?)
    }
}

/// Reject names the cluster would refuse as labels
pub fn validate_release_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| RepoError::InvalidReleaseName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_RELEASE_NAME_LEN {
        return Err(invalid("name is longer than 53 characters"));
    }
    if !RELEASE_NAME.is_match(name) {
        return Err(invalid(
            "must consist of lower case alphanumeric characters or '-', and start and end with an alphanumeric character",
        ));
    }
    Ok(())
}

fn output_args(format: &str) -> [String; 2] {
    ["--output".to_string(), format.to_string()]
}

fn scope_args(scope: &NamespaceScope) -> Vec<String> {
    match scope {
        NamespaceScope::All => vec!["--all-namespaces".to_string()],
        NamespaceScope::Namespace(ns) => vec!["--namespace".to_string(), ns.clone()],
    }
}

fn path_arg(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Newest first; versions that are not semver sort last, in input order
fn sort_by_version_desc(charts: &mut [ChartSummary]) {
    charts.sort_by(|a, b| {
        let parse = |v: &str| semver::Version::parse(v.trim_start_matches('v')).ok();
        match (parse(&a.version), parse(&b.version)) {
            (Some(va), Some(vb)) => vb.cmp(&va),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
}


#[cfg(all(test, unix))]
mod tool_tests {
    use super::*;
    use crate::testutil::{FakeHelm, build_archive};
    use crate::types::ReleaseStatus;
    use tempfile::TempDir;

    fn chart() -> Vec<u8> {
        build_archive(&[("nginx/Chart.yaml", "name: nginx\nversion: 15.0.0\n")])
    }

    const RELEASE_JSON: &str = r#"{"name":"web","namespace":"prod","version":3,"info":{"first_deployed":"2024-05-01T08:00:00Z","last_deployed":"2024-05-02T10:00:00Z","description":"Upgrade complete","status":"deployed","notes":"Visit http://web.example.com"},"chart":{"metadata":{"name":"nginx","version":"15.0.0","appVersion":"1.25.0"}},"config":{"replicaCount":2},"manifest":"---\nkind: Service\n"}"#;

    #[tokio::test]
    async fn test_list_releases_all_namespaces() {
        let temp = TempDir::new().unwrap();
        let helm = FakeHelm::new(temp.path(), &chart());
        helm.respond(
            "list",
            r#"[{"name":"web","namespace":"prod","revision":"3","updated":"2024-05-02 10:00:00 +0000 UTC","status":"deployed","chart":"nginx-15.0.0","app_version":"1.25.0"}]"#,
        );
        let client = PackageClient::new(helm.tool());

        let releases = client.list_releases(&NamespaceScope::All).await.unwrap();

        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].revision, 3);
        assert_eq!(helm.calls(), vec!["list --all --all-namespaces --output json"]);
    }

    #[tokio::test]
    async fn test_release_status() {
        let temp = TempDir::new().unwrap();
        let helm = FakeHelm::new(temp.path(), &chart());
        helm.respond("status-web", RELEASE_JSON);
        let client = PackageClient::new(helm.tool());

        let release = client.release_status("web", "prod").await.unwrap();

        assert_eq!(release.version, 3);
        assert_eq!(release.info.status, ReleaseStatus::Deployed);
        assert_eq!(release.chart.unwrap().metadata.app_version.as_deref(), Some("1.25.0"));
    }

    #[tokio::test]
    async fn test_missing_release_keeps_tool_error() {
        let temp = TempDir::new().unwrap();
        let helm = FakeHelm::new(temp.path(), &chart());
        helm.fail("status-ghost", "Error: release: not found\n", 1);
        let client = PackageClient::new(helm.tool());

        let err = client.release_status("ghost", "prod").await.unwrap_err();

        assert_eq!(err.code(), "NON_ZERO_EXIT");
        match err {
            RepoError::Core(CoreError::NonZeroExit { stderr, .. }) => {
                assert_eq!(stderr, "Error: release: not found\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stderr_on_success_is_an_error() {
        let temp = TempDir::new().unwrap();
        let helm = FakeHelm::new(temp.path(), &chart());
        helm.respond_with_stderr("repo-update", "", "Error: 1 of 2 repositories failed\n");
        helm.respond_with_stderr(
            "repo-remove",
            "\"stable\" has been removed\n",
            "WARNING: Kubernetes configuration file is group-readable\n",
        );
        let client = PackageClient::new(helm.tool());

        let err = client.repo_update().await.unwrap_err();
        assert_eq!(err.code(), "STDERR_REPORTED");

        client.repo_remove("stable").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_repo_list() {
        let temp = TempDir::new().unwrap();
        let helm = FakeHelm::new(temp.path(), &chart());
        helm.fail("repo-list", "Error: no repositories to show\n", 1);
        let client = PackageClient::new(helm.tool());

        assert!(client.repo_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chart_versions_are_sorted() {
        let temp = TempDir::new().unwrap();
        let helm = FakeHelm::new(temp.path(), &chart());
        helm.respond(
            "search-repo",
            r#"[{"name":"bitnami/nginx","version":"9.9.0","app_version":"1.21.0","description":"NGINX"},{"name":"bitnami/nginx","version":"15.0.0","app_version":"1.25.0","description":"NGINX"}]"#,
        );
        let client = PackageClient::new(helm.tool());

        let versions = client.chart_versions("bitnami/nginx").await.unwrap();

        assert_eq!(versions[0].version, "15.0.0");
        assert_eq!(
            helm.calls(),
            vec!["search repo --regexp ^bitnami/nginx$ --versions --output json"]
        );
    }

    #[tokio::test]
    async fn test_install_uses_cached_archive_and_values_file() {
        let temp = TempDir::new().unwrap();
        let helm = FakeHelm::new(temp.path(), &chart());
        helm.respond("install-web", RELEASE_JSON);
        let client = PackageClient::new(helm.tool());

        let key = CacheKey::new("bitnami/nginx", "15.0.0").unwrap();
        let request = ReleaseRequest::new("web", "prod", key.clone())
            .values(serde_json::json!({"replicaCount": 2}))
            .create_namespace(true)
            .wait(Duration::from_secs(120));

        let release = client.install(&request).await.unwrap();
        assert_eq!(release.name, "web");

        let calls = helm.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("pull bitnami/nginx --version 15.0.0"));
        let install = &calls[1];
        let archive = client.cache().archive_path(&key);
        assert!(install.starts_with(&format!(
            "install web {} --namespace prod --create-namespace --values ",
            archive.display()
        )));
        assert!(install.ends_with("--output json --wait --timeout 120s"));

        // The values file is transient
        let leftovers = std::fs::read_dir(client.tool().layout().temp_dir())
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_upgrade_flags() {
        let temp = TempDir::new().unwrap();
        let helm = FakeHelm::new(temp.path(), &chart());
        helm.respond("upgrade-web", RELEASE_JSON);
        let client = PackageClient::new(helm.tool());

        let key = CacheKey::new("bitnami/nginx", "15.0.0").unwrap();
        let options = UpgradeOptions {
            install: true,
            reuse_values: true,
            atomic: false,
        };
        client
            .upgrade(&ReleaseRequest::new("web", "prod", key), &options)
            .await
            .unwrap();

        let calls = helm.calls();
        assert!(calls[1].ends_with("--namespace prod --install --reuse-values --output json"));
    }

    #[tokio::test]
    async fn test_invalid_release_name_never_runs_tool() {
        let temp = TempDir::new().unwrap();
        let helm = FakeHelm::new(temp.path(), &chart());
        let client = PackageClient::new(helm.tool());

        let err = client.uninstall("Bad_Name", "prod").await.unwrap_err();

        assert!(matches!(err, RepoError::InvalidReleaseName { .. }));
        assert!(helm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_and_plugins() {
        let temp = TempDir::new().unwrap();
        let helm = FakeHelm::new(temp.path(), &chart());
        helm.respond("plugin-list", "NAME\tVERSION\tDESCRIPTION\ndiff\t3.9.4\tPreview helm upgrade changes as a diff\n");
        let client = PackageClient::new(helm.tool());

        client.rollback("web", "prod", Some(2)).await.unwrap();
        let plugins = client.plugin_list().await.unwrap();

        assert_eq!(plugins[0].name, "diff");
        assert_eq!(helm.calls()[0], "rollback web 2 --namespace prod");
    }

    #[tokio::test]
    async fn test_show_chart_decodes_yaml() {
        let temp = TempDir::new().unwrap();
        let helm = FakeHelm::new(temp.path(), &chart());
        helm.respond(
            "show-chart",
            "apiVersion: v2\nname: nginx\nversion: 15.0.0\nappVersion: 1.25.0\nkeywords:\n- http\n",
        );
        let client = PackageClient::new(helm.tool());

        let key = CacheKey::new("bitnami/nginx", "15.0.0").unwrap();
        let metadata = client.show_chart(&key).await.unwrap();

        assert_eq!(metadata.name, "nginx");
        assert_eq!(metadata.keywords, vec!["http"]);
    }
}
