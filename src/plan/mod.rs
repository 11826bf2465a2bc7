//! Partition planning for the stick layout
//!
//! A [`PartitionPlan`] always holds four slots in a fixed order: bulk storage,
//! the EFI system partition, the Linux system partition and trailing free
//! space. The ESP has a fixed size; the other three are sized by weight.

use serde::Serialize;

use crate::config::Config;
use crate::usb::types::{DeviceGeometry, MIB};

pub mod detect;
pub mod sizing;
pub mod table;
pub mod validate;

pub use detect::{detect, detect_device};
pub use sizing::{SizingError, compute_sizes};
pub use table::assemble;
pub use validate::validate;

/// Number of slots tracked by every plan.
pub const SLOT_COUNT: usize = 4;

/// Space kept out of every layout: 1 MiB alignment in front, GPT backup at the end.
pub const GPT_OVERHEAD_MIB: u64 = 2;

/// GPT partition type GUIDs
pub mod partition_types {
    /// Microsoft basic data, readable by every desktop OS
    pub const BASIC_DATA: &str = "ebd0a0a2-b9e5-4433-87c0-68b6b72699c7";
    /// EFI System Partition
    pub const EFI_SYSTEM: &str = "c12a7328-f81f-11d2-ba4b-00a0c93ec93b";
    /// Linux filesystem data
    pub const LINUX_FILESYSTEM: &str = "0fc63daf-8483-4772-8e79-3d69d8477de4";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Storage,
    Esp,
    System,
    FreeSpace,
}

impl SlotKind {
    pub const ALL: [SlotKind; SLOT_COUNT] = [
        SlotKind::Storage,
        SlotKind::Esp,
        SlotKind::System,
        SlotKind::FreeSpace,
    ];

    pub fn index(self) -> usize {
        match self {
            SlotKind::Storage => 0,
            SlotKind::Esp => 1,
            SlotKind::System => 2,
            SlotKind::FreeSpace => 3,
        }
    }

    /// Weighted slots share the space left after the fixed ESP
    pub fn is_weighted(self) -> bool {
        !matches!(self, SlotKind::Esp)
    }

    /// Free space is a placeholder and never gets a table entry
    pub fn type_guid(self) -> Option<&'static str> {
        match self {
            SlotKind::Storage => Some(partition_types::BASIC_DATA),
            SlotKind::Esp => Some(partition_types::EFI_SYSTEM),
            SlotKind::System => Some(partition_types::LINUX_FILESYSTEM),
            SlotKind::FreeSpace => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            SlotKind::Storage => "storage",
            SlotKind::Esp => "esp",
            SlotKind::System => "system",
            SlotKind::FreeSpace => "free",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSlot {
    pub kind: SlotKind,
    /// Label shown to the user and written as GPT partition name
    pub name: String,
    pub enabled: bool,
    pub min_size_mib: u64,
    /// Only meaningful while `enabled` is set
    pub size_mib: u64,
    /// Device node once the table has been written or the slot was detected
    pub node: Option<String>,
}

impl PartitionSlot {
    pub fn new(kind: SlotKind, name: impl Into<String>, min_size_mib: u64) -> Self {
        Self {
            kind,
            name: name.into(),
            enabled: false,
            min_size_mib,
            size_mib: 0,
            node: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionPlan {
    pub geometry: DeviceGeometry,
    pub slots: [PartitionSlot; SLOT_COUNT],
}

impl PartitionPlan {
    /// Empty plan for a freshly selected device. Names and minimums come from
    /// the configuration, every slot starts disabled.
    pub fn new(geometry: DeviceGeometry, config: &Config) -> Self {
        let slots = SlotKind::ALL.map(|kind| {
            PartitionSlot::new(kind, config.labels.get(kind), config.minimums.get(kind))
        });
        Self { geometry, slots }
    }

    pub fn slot(&self, kind: SlotKind) -> &PartitionSlot {
        &self.slots[kind.index()]
    }

    pub fn slot_mut(&mut self, kind: SlotKind) -> &mut PartitionSlot {
        &mut self.slots[kind.index()]
    }

    pub fn enabled_slots(&self) -> impl Iterator<Item = &PartitionSlot> {
        self.slots.iter().filter(|s| s.enabled)
    }

    /// Whole MiB on the device, rounded down
    pub fn total_mib(&self) -> u64 {
        self.geometry.total_bytes / MIB
    }

    /// Sizing ceiling: device size minus the GPT overhead
    pub fn usable_mib(&self) -> u64 {
        self.total_mib().saturating_sub(GPT_OVERHEAD_MIB)
    }

    #[cfg(test)]
    pub fn allocated_mib(&self) -> u64 {
        self.enabled_slots().map(|s| s.size_mib).sum()
    }

    pub fn has_weighted_slot(&self) -> bool {
        self.enabled_slots().any(|s| s.kind.is_weighted())
    }

    /// Turns on the slots picked by the user for a fresh layout. The ESP is
    /// always part of a fresh layout.
    pub fn select(&mut self, storage: bool, system: bool, free: bool) {
        for slot in self.slots.iter_mut() {
            slot.enabled = match slot.kind {
                SlotKind::Storage => storage,
                SlotKind::Esp => true,
                SlotKind::System => system,
                SlotKind::FreeSpace => free,
            };
            slot.node = None;
        }
    }
}
