//! Pull command - download a chart into the local cache

use console::style;
use helmgate_repo::CacheKey;

use super::Context;
use crate::error::Result;

/// Pull a chart, optionally extracting it
pub async fn run(
    ctx: &Context,
    reference: &str,
    version: &str,
    untar: bool,
    refresh: bool,
) -> Result<()> {
    let key = CacheKey::new(reference, version)?;
    let client = ctx.client();

    let archive = client.pull(&key, refresh).await?;
    let chart_dir = if untar {
        Some(client.pull_extracted(&key, false).await?)
    } else {
        None
    };

    if ctx.json {
        return ctx.print_json(&serde_json::json!({
            "reference": key.reference(),
            "version": key.version(),
            "archive": archive,
            "chartDir": chart_dir,
        }));
    }

    println!("{} Pulled {}", style("✓").green().bold(), style(&key).cyan());
    println!("  Archive: {}", archive.display());
    if let Some(dir) = chart_dir {
        println!("  Chart:   {}", dir.display());
    }
    Ok(())
}
