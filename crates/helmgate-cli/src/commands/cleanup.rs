//! Cleanup command - delete stale transient files

use console::style;

use super::Context;
use crate::error::Result;

pub fn run(ctx: &Context) -> Result<()> {
    let max_age = ctx.settings.temp_max_age;
    let removed = ctx.settings.layout().cleanup_temp(max_age);

    if ctx.json {
        return ctx.print_json(&serde_json::json!({ "removed": removed }));
    }

    println!(
        "{} Removed {} transient file(s) older than {}s",
        style("✓").green().bold(),
        removed,
        max_age.as_secs()
    );
    Ok(())
}
