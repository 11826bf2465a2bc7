//! sfdisk script generation

use std::fmt::Write;
use thiserror::Error;

use super::PartitionPlan;
use crate::usb::types::MIB;

/// Sectors kept free at the end of the disk for the backup GPT
const GPT_BACKUP_SECTORS: u64 = 34;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("sector size {0} is not a power of two")]
    InvalidSectorSize(u64),
    #[error("{name} ends at sector {end}, past the last usable sector {last_lba}")]
    DoesNotFit { name: String, end: u64, last_lba: u64 },
    #[error("{0} has a size of zero")]
    ZeroSize(String),
    #[error("plan has no partitions to write")]
    Empty,
}

/// Turn an accepted plan into input for `sfdisk`.
///
/// Entries are laid out back to back from the 1 MiB boundary in slot order.
/// Free space never gets an entry.
pub fn assemble(plan: &PartitionPlan) -> Result<String, TableError> {
    let sector_size = plan.geometry.sector_size;
    if sector_size == 0 || !sector_size.is_power_of_two() {
        return Err(TableError::InvalidSectorSize(sector_size));
    }

    let first_lba = MIB / sector_size;
    let last_lba = plan
        .geometry
        .total_sectors()
        .saturating_sub(GPT_BACKUP_SECTORS);

    let mut script = String::new();
    let _ = writeln!(script, "label: gpt");
    let _ = writeln!(script, "unit: sectors");
    let _ = writeln!(script, "sector-size: {}", sector_size);
    let _ = writeln!(script, "first-lba: {}", first_lba);
    let _ = writeln!(script, "last-lba: {}", last_lba);
    let _ = writeln!(script);

    let mut start = first_lba;
    let mut entries = 0;
    for slot in plan.enabled_slots() {
        let Some(guid) = slot.kind.type_guid() else {
            continue;
        };

        // sfdisk reads a zero size as "rest of the disk"
        let size = slot.size_mib * MIB / sector_size;
        if size == 0 {
            return Err(TableError::ZeroSize(slot.name.clone()));
        }
        let end = start + size;
        if end > last_lba + 1 {
            return Err(TableError::DoesNotFit {
                name: slot.name.clone(),
                end: end - 1,
                last_lba,
            });
        }

        let _ = writeln!(
            script,
            "start={},size={},type={},name=\"{}\"",
            start,
            size,
            guid,
            slot.name.replace('"', "")
        );
        start = end;
        entries += 1;
    }

    if entries == 0 {
        return Err(TableError::Empty);
    }

    Ok(script)
}
