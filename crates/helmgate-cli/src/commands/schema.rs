//! Schema command - resolve the served version of a resource kind

use helmgate_kube::{ClusterProbe, ResourceKind, SchemaVersionResolver};

use super::Context;
use crate::error::{CliError, Result};

/// Resolve the first candidate version the cluster accepts
pub async fn resolve(ctx: &Context, kind: &ResourceKind, versions: &[String]) -> Result<()> {
    let candidates: Vec<String> = if versions.is_empty() {
        ctx.settings
            .schema_candidates(&kind.id())
            .map(<[String]>::to_vec)
            .ok_or_else(|| {
                CliError::input_with_help(
                    format!("no candidate versions for {}", kind.id()),
                    format!(
                        "Pass --versions, or set schemaVersions.\"{}\" in the settings file",
                        kind.id()
                    ),
                )
            })?
    } else {
        if versions.iter().any(|v| v.trim().is_empty()) {
            return Err(CliError::input("--versions must not contain empty entries"));
        }
        versions.iter().map(|v| v.trim().to_string()).collect()
    };

    let probe = ClusterProbe::connect(ctx.settings.kubeconfig.as_deref()).await?;
    let resolver = SchemaVersionResolver::new(probe);
    let version = resolver.resolve(kind, candidates.as_slice()).await?;

    if ctx.json {
        return ctx.print_json(&serde_json::json!({
            "kind": kind.id(),
            "version": version,
        }));
    }

    println!("{}", version);
    Ok(())
}
