//! Release commands - list, status, history, uninstall, rollback

use console::style;
use helmgate_repo::{NamespaceScope, ReleaseStatus};

use super::Context;
use crate::error::Result;

fn status_style(status: ReleaseStatus) -> console::StyledObject<ReleaseStatus> {
    match status {
        ReleaseStatus::Deployed => style(status).green(),
        ReleaseStatus::Failed => style(status).red(),
        s if s.is_pending() => style(status).yellow(),
        _ => style(status).dim(),
    }
}

/// List releases in one namespace or all of them
pub async fn list(ctx: &Context, namespace: &str, all_namespaces: bool) -> Result<()> {
    let scope = if all_namespaces {
        NamespaceScope::All
    } else {
        NamespaceScope::Namespace(namespace.to_string())
    };
    let releases = ctx.client().list_releases(&scope).await?;

    if ctx.json {
        return ctx.print_json(&releases);
    }

    if releases.is_empty() {
        if all_namespaces {
            println!("No releases found in any namespace");
        } else {
            println!("No releases found in namespace {}", namespace);
        }
        return Ok(());
    }

    println!(
        "{:<25} {:<15} {:<10} {:<18} {}",
        style("NAME").bold(),
        style("NAMESPACE").bold(),
        style("REVISION").bold(),
        style("STATUS").bold(),
        style("CHART").bold()
    );
    for release in releases {
        println!(
            "{:<25} {:<15} {:<10} {:<18} {}",
            release.name,
            release.namespace,
            release.revision,
            status_style(release.status),
            release.chart
        );
    }
    Ok(())
}

/// Show the current state of a release
pub async fn status(ctx: &Context, name: &str, namespace: &str) -> Result<()> {
    let release = ctx.client().release_status(name, namespace).await?;

    if ctx.json {
        return ctx.print_json(&release);
    }

    println!("{}: {}", style("NAME").bold(), release.name);
    println!("{}: {}", style("NAMESPACE").bold(), release.namespace);
    println!("{}: {}", style("STATUS").bold(), status_style(release.info.status));
    println!("{}: {}", style("REVISION").bold(), release.version);
    if let Some(deployed) = &release.info.last_deployed {
        println!("{}: {}", style("LAST DEPLOYED").bold(), deployed);
    }
    if let Some(chart) = &release.chart {
        println!(
            "{}: {}-{}",
            style("CHART").bold(),
            chart.metadata.name,
            chart.metadata.version
        );
    }
    if !release.info.description.is_empty() {
        println!("{}: {}", style("DESCRIPTION").bold(), release.info.description);
    }
    if let Some(notes) = release.info.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        println!();
        println!("{}", style("NOTES:").bold());
        println!("{}", notes.trim_end());
    }
    Ok(())
}

/// Show the revision history of a release
pub async fn history(ctx: &Context, name: &str, namespace: &str) -> Result<()> {
    let revisions = ctx.client().release_history(name, namespace).await?;

    if ctx.json {
        return ctx.print_json(&revisions);
    }

    println!(
        "{:<10} {:<18} {:<25} {}",
        style("REVISION").bold(),
        style("STATUS").bold(),
        style("CHART").bold(),
        style("DESCRIPTION").bold()
    );
    for revision in revisions {
        println!(
            "{:<10} {:<18} {:<25} {}",
            revision.revision,
            status_style(revision.status),
            revision.chart,
            revision.description
        );
    }
    Ok(())
}

/// Uninstall a release
pub async fn uninstall(ctx: &Context, name: &str, namespace: &str) -> Result<()> {
    ctx.client().uninstall(name, namespace).await?;
    println!(
        "{} Release {} uninstalled from {}",
        style("✓").green().bold(),
        style(name).cyan(),
        namespace
    );
    Ok(())
}

/// Roll a release back to an earlier revision
pub async fn rollback(
    ctx: &Context,
    name: &str,
    namespace: &str,
    revision: Option<u32>,
) -> Result<()> {
    ctx.client().rollback(name, namespace, revision).await?;
    match revision {
        Some(revision) => println!(
            "{} Rolled back {} to revision {}",
            style("✓").green().bold(),
            style(name).cyan(),
            revision
        ),
        None => println!(
            "{} Rolled back {} to the previous revision",
            style("✓").green().bold(),
            style(name).cyan()
        ),
    }
    Ok(())
}
