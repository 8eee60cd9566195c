//! Repository management commands

use console::style;

use super::Context;
use crate::error::Result;

/// Add a chart repository
pub async fn add(ctx: &Context, name: &str, url: &str) -> Result<()> {
    ctx.client().repo_add(name, url).await?;
    println!("\"{}\" has been added to your repositories", name);
    Ok(())
}

/// Remove a chart repository
pub async fn remove(ctx: &Context, name: &str) -> Result<()> {
    ctx.client().repo_remove(name).await?;
    println!("\"{}\" has been removed from your repositories", name);
    Ok(())
}

/// List configured repositories
pub async fn list(ctx: &Context) -> Result<()> {
    let repos = ctx.client().repo_list().await?;

    if ctx.json {
        return ctx.print_json(&repos);
    }

    if repos.is_empty() {
        println!("No repositories configured.");
        println!();
        println!("Add one with: helmgate repo add <name> <url>");
        return Ok(());
    }

    println!("{:<20} {}", style("NAME").bold(), style("URL").bold());
    for repo in &repos {
        println!("{:<20} {}", repo.name, repo.url);
    }
    Ok(())
}

/// Refresh every repository index
pub async fn update(ctx: &Context) -> Result<()> {
    ctx.client().repo_update().await?;
    println!("{} Repository indexes updated", style("✓").green().bold());
    Ok(())
}
