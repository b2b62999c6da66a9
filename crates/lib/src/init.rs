//! Initialize the configuration directory: create `~/.teletrader` and a template config.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

static CONFIG_TEMPLATE: &str = include_str!("../config/config.json");

/// Create the config directory and write the template config if no config exists yet.
/// An existing config is never overwritten. Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
    } else {
        std::fs::write(config_path, CONFIG_TEMPLATE)
            .with_context(|| format!("writing template config to {}", config_path.display()))?;
        log::info!("created template config at {}", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}
