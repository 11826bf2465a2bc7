//! Recognise a stick that was prepared earlier

use anyhow::Result;
use serde::Serialize;
use std::fmt;

use super::{PartitionPlan, SlotKind, partition_types};
use crate::ui::prelude::*;
use crate::usb::PartitionInfo;
use crate::usb::probe;

/// Why an existing layout can't be reused. Several conditions can hold at
/// once; no flag set means the layout is usable as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompatibilityFlags {
    pub esp_missing: bool,
    pub system_missing: bool,
    pub esp_wrong_filesystem: bool,
    pub esp_too_small: bool,
    pub system_too_small: bool,
}

impl CompatibilityFlags {
    pub fn is_compatible(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the flags that are set
    pub fn reasons(&self) -> Vec<&'static str> {
        [
            (self.esp_missing, "EFI system partition missing"),
            (self.system_missing, "system partition missing"),
            (self.esp_wrong_filesystem, "EFI system partition is not FAT formatted"),
            (self.esp_too_small, "EFI system partition too small"),
            (self.system_too_small, "system partition too small"),
        ]
        .into_iter()
        .filter_map(|(set, reason)| set.then_some(reason))
        .collect()
    }
}

impl fmt::Display for CompatibilityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_compatible() {
            write!(f, "compatible")
        } else {
            write!(f, "{}", self.reasons().join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub plan: PartitionPlan,
    pub flags: CompatibilityFlags,
}

pub fn is_efi_partition(part_type: &str) -> bool {
    let part_type = part_type.to_lowercase();
    part_type == partition_types::EFI_SYSTEM || part_type == "0xef" || part_type == "ef"
}

fn is_fat(fs_type: Option<&str>) -> bool {
    fs_type.is_some_and(|fs| {
        matches!(
            fs.to_lowercase().as_str(),
            "vfat" | "fat" | "fat12" | "fat16" | "fat32" | "msdos"
        )
    })
}

#[derive(Default)]
struct Candidates {
    found: bool,
    rejected_fs: bool,
    rejected_size: bool,
}

/// Rebuild a plan from the partitions already on a device.
///
/// `template` supplies the geometry, names and minimum sizes; its enabled
/// flags and sizes are ignored. Rejection flags are only reported for a
/// role that ends up without a qualifying partition.
pub fn detect(partitions: &[PartitionInfo], template: &PartitionPlan) -> Detection {
    let mut plan = template.clone();
    for slot in plan.slots.iter_mut() {
        slot.enabled = false;
        slot.size_mib = 0;
        slot.node = None;
    }

    let esp_min = plan.slot(SlotKind::Esp).min_size_mib;
    let system_min = plan.slot(SlotKind::System).min_size_mib;
    let system_name = plan.slot(SlotKind::System).name.clone();
    let storage_name = plan.slot(SlotKind::Storage).name.clone();

    let mut esp = Candidates::default();
    let mut system = Candidates::default();

    for part in partitions {
        let label = part.label.as_deref();

        if part.part_type.as_deref().is_some_and(is_efi_partition) {
            let fat = is_fat(part.fs_type.as_deref());
            let big_enough = part.size_mib() >= esp_min;
            emit(
                Level::Debug,
                "detect.esp",
                &format!(
                    "{}: fat={} size={} MiB (min {})",
                    part.path,
                    fat,
                    part.size_mib(),
                    esp_min
                ),
                None,
            );

            if !fat {
                esp.rejected_fs = true;
            }
            if !big_enough {
                esp.rejected_size = true;
            }
            if fat && big_enough && !esp.found {
                esp.found = true;
                claim(&mut plan, SlotKind::Esp, part);
            }
        } else if label == Some(system_name.as_str()) {
            let big_enough = part.size_mib() >= system_min;
            emit(
                Level::Debug,
                "detect.system",
                &format!(
                    "{}: size={} MiB (min {})",
                    part.path,
                    part.size_mib(),
                    system_min
                ),
                None,
            );

            if big_enough && !system.found {
                system.found = true;
                claim(&mut plan, SlotKind::System, part);
            } else if !big_enough {
                system.rejected_size = true;
            }
        } else if label == Some(storage_name.as_str()) && !plan.slot(SlotKind::Storage).enabled {
            claim(&mut plan, SlotKind::Storage, part);
        }
    }

    let flags = CompatibilityFlags {
        esp_missing: !esp.found,
        system_missing: !system.found,
        esp_wrong_filesystem: !esp.found && esp.rejected_fs,
        esp_too_small: !esp.found && esp.rejected_size,
        system_too_small: !system.found && system.rejected_size,
    };

    emit(
        Level::Info,
        "detect.layout",
        &format!("Existing layout: {}", flags),
        Some(serde_json::json!({ "flags": flags })),
    );

    Detection { plan, flags }
}

fn claim(plan: &mut PartitionPlan, kind: SlotKind, part: &PartitionInfo) {
    let slot = plan.slot_mut(kind);
    slot.enabled = true;
    slot.size_mib = part.size_mib();
    slot.node = Some(part.path.clone());
}

/// Enumerate the partitions of `device` and run [`detect`] on them
pub fn detect_device(device: &str, template: &PartitionPlan) -> Result<Detection> {
    let partitions = probe::list_partitions(device)?;
    Ok(detect(&partitions, template))
}
