//! Validate a config file.

use std::path::PathBuf;

use alphaplay_common::config::{config_file_path, ToolConfig};

pub fn run(path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(config_file_path);
    if !path.exists() {
        println!("[WARN] No config at {}; defaults apply", path.display());
        let defaults = ToolConfig::default();
        println!("{}", serde_json::to_string_pretty(&defaults)?);
        return Ok(());
    }

    let config = ToolConfig::load_from(&path)
        .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
    println!("[OK] {}", path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
