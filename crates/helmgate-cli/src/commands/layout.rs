//! Layout command - print the working directories

use std::path::PathBuf;

use super::Context;
use crate::error::Result;

pub fn run(ctx: &Context) -> Result<()> {
    let layout = ctx.settings.layout();
    let entries: [(&str, PathBuf); 8] = [
        ("root", layout.root().to_path_buf()),
        ("cache", layout.cache_home()),
        ("config", layout.config_home()),
        ("data", layout.data_home()),
        ("plugins", layout.plugins_dir()),
        ("downloads", layout.downloads_dir()),
        ("charts", layout.charts_dir()),
        ("tmp", layout.temp_dir()),
    ];

    if ctx.json {
        let map: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(name, path)| {
                (
                    name.to_string(),
                    serde_json::Value::String(path.display().to_string()),
                )
            })
            .collect();
        return ctx.print_json(&map);
    }

    for (name, path) in &entries {
        println!("{:<10} {}", name, path.display());
    }
    Ok(())
}
