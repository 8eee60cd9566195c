//! Search command

use super::Context;
use crate::error::Result;

/// Search configured repositories for charts
pub async fn run(ctx: &Context, keyword: &str, versions: bool) -> Result<()> {
    let results = ctx.client().search(keyword, versions).await?;

    if ctx.json {
        return ctx.print_json(&results);
    }

    if results.is_empty() {
        println!("No results found for '{}'", keyword);
        return Ok(());
    }

    println!(
        "{:<35} {:<15} {:<15} DESCRIPTION",
        "NAME", "VERSION", "APP VERSION"
    );
    for chart in results {
        let desc: String = chart.description.chars().take(50).collect();
        println!(
            "{:<35} {:<15} {:<15} {}",
            chart.name, chart.version, chart.app_version, desc
        );
    }
    Ok(())
}
