//! Block device data shared by probing, planning and the wizard

use serde::{Deserialize, Serialize};
use std::fmt;

pub const KIB: u64 = 1024;
pub const MIB: u64 = KIB * 1024;
pub const GIB: u64 = MIB * 1024;
pub const TIB: u64 = GIB * 1024;

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    if bytes >= TIB {
        format!("{:.1} TiB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{} MiB", bytes / MIB)
    } else if bytes >= KIB {
        format!("{} KiB", bytes / KIB)
    } else {
        format!("{} B", bytes)
    }
}

/// Size of a device as reported by the geometry query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceGeometry {
    pub total_bytes: u64,
    /// Logical sector size, a power of two
    pub sector_size: u64,
}

impl DeviceGeometry {
    pub fn total_sectors(&self) -> u64 {
        if self.sector_size == 0 {
            return 0;
        }
        self.total_bytes / self.sector_size
    }
}

/// A size in whole MiB, as typed into and shown by the sizing form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MibSize(u64);

impl MibSize {
    pub fn new(mib: u64) -> Self {
        Self(mib)
    }

    /// Parse a size string ("512", "512M", "1.5G", "3.1 GiB") into MiB.
    /// A bare number is taken as MiB.
    pub fn parse(size_str: &str) -> Option<Self> {
        let cleaned = size_str.trim().to_uppercase();
        if cleaned.is_empty() {
            return None;
        }

        let split = cleaned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(cleaned.len());
        let (number, unit) = cleaned.split_at(split);
        let value: f64 = number.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }

        let unit = unit.trim();
        let unit = unit
            .strip_suffix("IB")
            .or_else(|| unit.strip_suffix('B'))
            .unwrap_or(unit);

        let factor = match unit {
            "" | "M" => 1.0,
            "K" => 1.0 / KIB as f64,
            "G" => KIB as f64,
            "T" => (KIB * KIB) as f64,
            _ => return None,
        };

        Some(Self((value * factor).floor() as u64))
    }

    pub fn in_mib(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MibSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_size(self.0.saturating_mul(MIB)))
    }
}

/// One partition as listed by `lsblk`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    /// Kernel name (e.g., sdb1)
    pub name: String,
    /// Device node (e.g., /dev/sdb1)
    pub path: String,
    /// Block device type, "part" for partitions
    pub kind: String,
    /// GPT type GUID or MBR type code
    pub part_type: Option<String>,
    /// GPT partition name
    pub label: Option<String>,
    pub fs_type: Option<String>,
    pub size_bytes: u64,
    pub mountpoint: Option<String>,
}

impl PartitionInfo {
    pub fn size_mib(&self) -> u64 {
        self.size_bytes / MIB
    }
}

/// A removable USB disk offered for selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDevice {
    pub path: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub size_bytes: u64,
}

impl UsbDevice {
    /// Human-readable label for menus
    pub fn label(&self) -> String {
        let name = [self.vendor.as_deref(), self.model.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let name = if name.is_empty() {
            "USB disk".to_string()
        } else {
            name
        };
        format!("{} ({})", name, format_size(self.size_bytes))
    }
}
