use anyhow::{Context, Result};
use std::process::Command;

use super::CommandExecutor;
use crate::config::StorageFilesystem;
use crate::plan::{PartitionPlan, PartitionSlot, SlotKind};
use crate::ui::prelude::*;
use crate::usb::{PartitionInfo, part_path};

/// Unmount whatever the desktop mounted from the stick
pub fn release_device(partitions: &[PartitionInfo], executor: &CommandExecutor) -> Result<()> {
    for part in partitions {
        if let Some(mountpoint) = &part.mountpoint {
            emit(
                Level::Info,
                "disk.release",
                &format!("Unmounting {} from {}", part.path, mountpoint),
                None,
            );
            executor
                .run(Command::new("umount").arg(&part.path))
                .with_context(|| format!("{} is busy", part.path))?;
        }
    }
    Ok(())
}

/// Replace the partition table of `device` with `script`
pub fn write_table(device: &str, script: &str, executor: &CommandExecutor) -> Result<()> {
    emit(
        Level::Info,
        "disk.write_table",
        &format!("Writing partition table to {}", device),
        None,
    );

    executor
        .run_with_input(
            Command::new("sfdisk").args([
                "--wipe",
                "always",
                "--wipe-partitions",
                "always",
                device,
            ]),
            script,
        )
        .with_context(|| format!("Failed to write partition table to {}", device))?;

    if !executor.dry_run {
        executor.run(Command::new("udevadm").arg("settle"))?;
    }

    Ok(())
}

/// Record the node of every slot that got a table entry, numbered in slot
/// order the way the table was written.
pub fn assign_nodes(device: &str, plan: &mut PartitionPlan) {
    let mut number = 0;
    for slot in plan.slots.iter_mut() {
        if slot.enabled && slot.kind.type_guid().is_some() {
            number += 1;
            slot.node = Some(part_path(device, number));
        } else {
            slot.node = None;
        }
    }
}

fn fs_label(name: &str, max: usize) -> String {
    name.chars().take(max).collect()
}

/// mkfs invocation for a slot, None for free space
pub fn mkfs_command(slot: &PartitionSlot, storage_fs: StorageFilesystem) -> Option<Command> {
    let node = slot.node.as_deref()?;
    let mut cmd;
    match slot.kind {
        SlotKind::Storage => {
            cmd = Command::new(storage_fs.mkfs_tool());
            match storage_fs {
                StorageFilesystem::Exfat => {
                    cmd.args(["-n", &fs_label(&slot.name, 15)]);
                }
                StorageFilesystem::Vfat => {
                    cmd.args(["-F", "32", "-n", &fs_label(&slot.name, 11)]);
                }
                StorageFilesystem::Ntfs => {
                    cmd.args(["-Q", "-L", &fs_label(&slot.name, 32)]);
                }
            }
        }
        SlotKind::Esp => {
            cmd = Command::new("mkfs.vfat");
            cmd.args(["-F", "32", "-n", &fs_label(&slot.name, 11)]);
        }
        SlotKind::System => {
            cmd = Command::new("mkfs.ext4");
            cmd.args(["-F", "-L", &fs_label(&slot.name, 16)]);
        }
        SlotKind::FreeSpace => return None,
    }
    cmd.arg(node);
    Some(cmd)
}

/// Create the filesystems of every enabled slot
pub fn format_slots(
    plan: &PartitionPlan,
    storage_fs: StorageFilesystem,
    executor: &CommandExecutor,
) -> Result<()> {
    for slot in plan.enabled_slots() {
        let Some(mut cmd) = mkfs_command(slot, storage_fs) else {
            continue;
        };
        emit(
            Level::Info,
            "disk.format",
            &format!(
                "Formatting {} ({})",
                slot.name,
                slot.node.as_deref().unwrap_or_default()
            ),
            None,
        );
        executor
            .run(&mut cmd)
            .with_context(|| format!("Failed to format {}", slot.name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::shell::command_line;
    use crate::plan::tests::plan_with;

    #[test]
    fn test_nodes_follow_table_order() {
        let mut plan = plan_with(8000, [0; 4]);
        plan.slot_mut(SlotKind::Storage).enabled = false;

        assign_nodes("/dev/mmcblk0", &mut plan);

        assert_eq!(plan.slot(SlotKind::Esp).node.as_deref(), Some("/dev/mmcblk0p1"));
        assert_eq!(plan.slot(SlotKind::System).node.as_deref(), Some("/dev/mmcblk0p2"));
        assert!(plan.slot(SlotKind::Storage).node.is_none());
        assert!(plan.slot(SlotKind::FreeSpace).node.is_none());
    }

    #[test]
    fn test_mkfs_commands() {
        let mut plan = plan_with(8000, [0; 4]);
        assign_nodes("/dev/sdb", &mut plan);

        let storage = mkfs_command(plan.slot(SlotKind::Storage), StorageFilesystem::Exfat).unwrap();
        assert_eq!(command_line(&storage), "mkfs.exfat -n STORAGE /dev/sdb1");

        let esp = mkfs_command(plan.slot(SlotKind::Esp), StorageFilesystem::Exfat).unwrap();
        assert_eq!(command_line(&esp), "mkfs.vfat -F 32 -n EFI /dev/sdb2");

        let system = mkfs_command(plan.slot(SlotKind::System), StorageFilesystem::Exfat).unwrap();
        assert_eq!(command_line(&system), "mkfs.ext4 -F -L SYSTEM /dev/sdb3");

        assert!(mkfs_command(plan.slot(SlotKind::FreeSpace), StorageFilesystem::Exfat).is_none());
    }

    #[test]
    fn test_vfat_label_is_truncated() {
        let mut plan = plan_with(8000, [0; 4]);
        plan.slot_mut(SlotKind::Storage).name = "MY LONG STORAGE NAME".to_string();
        assign_nodes("/dev/sdb", &mut plan);

        let cmd = mkfs_command(plan.slot(SlotKind::Storage), StorageFilesystem::Vfat).unwrap();
        assert_eq!(command_line(&cmd), "mkfs.vfat -F 32 -n 'MY LONG STO' /dev/sdb1");
    }

    #[test]
    fn test_dry_run_pipeline() {
        let executor = CommandExecutor::new(true);
        let mut plan = plan_with(8000, [0; 4]);
        assign_nodes("/dev/sdb", &mut plan);

        assert!(write_table("/dev/sdb", "label: gpt\n", &executor).is_ok());
        assert!(format_slots(&plan, StorageFilesystem::Ntfs, &executor).is_ok());
    }
}
