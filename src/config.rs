use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::paths;
use crate::plan::{SLOT_COUNT, SlotKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sizing: SizingConfig,
    pub minimums: SlotMinimums,
    pub labels: SlotLabels,
    pub filesystems: FilesystemConfig,
    pub bootloader: BootloaderConfig,
    pub logging: LoggingConfig,
}

/// Relative weights of the flexible partitions and the fixed ESP size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub storage_weight: u64,
    pub esp_size_mib: u64,
    pub system_weight: u64,
    pub free_weight: u64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            storage_weight: 2,
            esp_size_mib: 50,
            system_weight: 2,
            free_weight: 1,
        }
    }
}

impl SizingConfig {
    /// Arguments for the sizing engine, indexed like the plan's slots
    pub fn weights(&self) -> [u64; SLOT_COUNT] {
        [
            self.storage_weight,
            self.esp_size_mib,
            self.system_weight,
            self.free_weight,
        ]
    }
}

/// Minimum sizes in MiB
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotMinimums {
    pub storage: u64,
    pub esp: u64,
    pub system: u64,
    pub free: u64,
}

impl Default for SlotMinimums {
    fn default() -> Self {
        Self {
            storage: 500,
            esp: 50,
            system: 1000,
            free: 200,
        }
    }
}

impl SlotMinimums {
    pub fn get(&self, kind: SlotKind) -> u64 {
        match kind {
            SlotKind::Storage => self.storage,
            SlotKind::Esp => self.esp,
            SlotKind::System => self.system,
            SlotKind::FreeSpace => self.free,
        }
    }
}

/// Partition names. The system name is also how an existing system
/// partition is recognised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotLabels {
    pub storage: String,
    pub esp: String,
    pub system: String,
    pub free: String,
}

impl Default for SlotLabels {
    fn default() -> Self {
        Self {
            storage: "STORAGE".to_string(),
            esp: "EFI".to_string(),
            system: "SYSTEM".to_string(),
            free: "free space".to_string(),
        }
    }
}

impl SlotLabels {
    pub fn get(&self, kind: SlotKind) -> &str {
        match kind {
            SlotKind::Storage => &self.storage,
            SlotKind::Esp => &self.esp,
            SlotKind::System => &self.system,
            SlotKind::FreeSpace => &self.free,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFilesystem {
    Exfat,
    Vfat,
    Ntfs,
}

impl StorageFilesystem {
    pub fn mkfs_tool(self) -> &'static str {
        match self {
            StorageFilesystem::Exfat => "mkfs.exfat",
            StorageFilesystem::Vfat => "mkfs.vfat",
            StorageFilesystem::Ntfs => "mkfs.ntfs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemConfig {
    pub storage: StorageFilesystem,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            storage: StorageFilesystem::Exfat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootloaderConfig {
    /// grub-install targets, one run per entry
    pub targets: Vec<String>,
    pub bootloader_id: String,
}

impl Default for BootloaderConfig {
    fn default() -> Self {
        Self {
            targets: vec!["x86_64-efi".to_string()],
            bootloader_id: "BOOTSTICK".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log file, defaults to the user cache directory
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn file_path(&self) -> Result<PathBuf> {
        match &self.file {
            Some(path) => Ok(path.clone()),
            None => paths::default_log_file(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `path` is None.
    /// A missing file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Configuration file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => {
                let path = paths::default_config_file()?;
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading configuration from {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing configuration at {}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing configuration")
    }

    fn check(&self) -> Result<()> {
        let weights = self.sizing.weights();
        let flexible = [SlotKind::Storage, SlotKind::System, SlotKind::FreeSpace];
        if flexible.iter().all(|k| weights[k.index()] == 0) {
            anyhow::bail!("At least one of storage_weight, system_weight or free_weight must be non-zero");
        }
        if self.sizing.esp_size_mib < self.minimums.esp {
            anyhow::bail!(
                "esp_size_mib ({}) is below the ESP minimum ({})",
                self.sizing.esp_size_mib,
                self.minimums.esp
            );
        }
        if self.labels.system.trim().is_empty() {
            anyhow::bail!("labels.system must not be empty");
        }
        if self.bootloader.targets.is_empty() {
            anyhow::bail!("bootloader.targets must name at least one grub target");
        }
        Ok(())
    }
}
