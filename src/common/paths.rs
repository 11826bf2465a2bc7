use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable carrying the config path across privilege escalation
pub const CONFIG_ENV: &str = "BOOTSTICK_CONFIG";

/// Get the bootstick config directory
pub fn bootstick_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("bootstick"))
}

/// Location of config.toml when no path is given
pub fn default_config_file() -> Result<PathBuf> {
    Ok(bootstick_config_dir()?.join("config.toml"))
}

/// Get the bootstick log file, creating its directory
pub fn default_log_file() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("bootstick");

    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("creating log directory at {}", cache_dir.display()))?;

    Ok(cache_dir.join("bootstick.log"))
}
