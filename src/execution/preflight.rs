use anyhow::Result;

use crate::common::paths::CONFIG_ENV;
use crate::config::Config;

const BASE_TOOLS: &[&str] = &[
    "dialog",
    "lsblk",
    "blockdev",
    "sfdisk",
    "udevadm",
    "mount",
    "umount",
    "mkfs.vfat",
    "mkfs.ext4",
    "grub-install",
];

/// External programs the wizard shells out to
pub fn required_tools(config: &Config) -> Vec<&'static str> {
    let mut tools = BASE_TOOLS.to_vec();
    let storage = config.filesystems.storage.mkfs_tool();
    if !tools.contains(&storage) {
        tools.push(storage);
    }
    tools
}

pub fn missing_tools(config: &Config) -> Vec<&'static str> {
    required_tools(config)
        .into_iter()
        .filter(|tool| which::which(tool).is_err())
        .collect()
}

pub fn check_tools(config: &Config) -> Result<()> {
    let missing = missing_tools(config);
    if !missing.is_empty() {
        anyhow::bail!("Required programs not found: {}", missing.join(", "));
    }
    Ok(())
}

/// Re-run the current command through sudo when not already root
pub fn ensure_root() -> Result<()> {
    if let sudo::RunningAs::User = sudo::check() {
        sudo::with_env(&["RUST_BACKTRACE", "RUST_LOG", CONFIG_ENV])
            .map_err(|e| anyhow::anyhow!("Failed to escalate privileges: {}", e))?;
    }
    Ok(())
}
