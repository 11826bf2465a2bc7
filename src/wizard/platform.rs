use anyhow::Result;
use std::collections::BTreeMap;

use crate::config::{BootloaderConfig, StorageFilesystem};
use crate::execution::{CommandExecutor, bootloader, disk};
use crate::plan::PartitionPlan;
use crate::usb::{DeviceGeometry, PartitionInfo, probe};

/// Everything the wizard needs from the machine it runs on
pub trait Platform {
    /// Removable USB disks, device path to menu label
    fn usb_devices(&mut self) -> Result<BTreeMap<String, String>>;

    fn geometry(&mut self, device: &str) -> Result<DeviceGeometry>;

    fn partitions(&mut self, device: &str) -> Result<Vec<PartitionInfo>>;

    /// Unmount everything mounted from `device`
    fn release(&mut self, device: &str) -> Result<()>;

    /// Replace the partition table and fill in the slot nodes
    fn write_table(&mut self, device: &str, script: &str, plan: &mut PartitionPlan) -> Result<()>;

    fn format(&mut self, plan: &PartitionPlan) -> Result<()>;

    fn install_bootloader(&mut self, plan: &PartitionPlan) -> Result<()>;
}

/// Real devices through lsblk, sfdisk, mkfs and grub-install
pub struct HostPlatform {
    executor: CommandExecutor,
    storage_fs: StorageFilesystem,
    bootloader: BootloaderConfig,
}

impl HostPlatform {
    pub fn new(
        executor: CommandExecutor,
        storage_fs: StorageFilesystem,
        bootloader: BootloaderConfig,
    ) -> Self {
        Self {
            executor,
            storage_fs,
            bootloader,
        }
    }

    /// Commands that a dry run skipped, oldest first
    pub fn take_dry_run_log(&self) -> Vec<String> {
        self.executor.take_dry_run_log()
    }
}

impl Platform for HostPlatform {
    fn usb_devices(&mut self) -> Result<BTreeMap<String, String>> {
        Ok(probe::list_usb_devices()?
            .into_iter()
            .map(|d| {
                let label = d.label();
                (d.path, label)
            })
            .collect())
    }

    fn geometry(&mut self, device: &str) -> Result<DeviceGeometry> {
        probe::read_geometry(device)
    }

    fn partitions(&mut self, device: &str) -> Result<Vec<PartitionInfo>> {
        probe::list_partitions(device)
    }

    fn release(&mut self, device: &str) -> Result<()> {
        let partitions = probe::list_partitions(device)?;
        disk::release_device(&partitions, &self.executor)
    }

    fn write_table(&mut self, device: &str, script: &str, plan: &mut PartitionPlan) -> Result<()> {
        disk::write_table(device, script, &self.executor)?;
        disk::assign_nodes(device, plan);
        Ok(())
    }

    fn format(&mut self, plan: &PartitionPlan) -> Result<()> {
        disk::format_slots(plan, self.storage_fs, &self.executor)
    }

    fn install_bootloader(&mut self, plan: &PartitionPlan) -> Result<()> {
        bootloader::install_bootloader(plan, &self.bootloader, &self.executor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::cleanup;
    use crate::plan::tests::plan_with;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_dry_run_install_records_every_command() {
        cleanup::release_all();
        let mut platform = HostPlatform::new(
            CommandExecutor::new(true),
            StorageFilesystem::Ntfs,
            BootloaderConfig::default(),
        );
        let mut plan = plan_with(8000, [0; 4]);

        platform
            .write_table("/dev/sdb", "label: gpt\nfirst-lba: 2048\n", &mut plan)
            .unwrap();
        platform.format(&plan).unwrap();
        platform.install_bootloader(&plan).unwrap();
        cleanup::release_all();

        let lines = platform.take_dry_run_log();
        assert!(lines.iter().all(|l| l.starts_with("[DRY RUN]")));
        assert!(lines[0].contains("sfdisk --wipe always --wipe-partitions always /dev/sdb"));
        assert!(lines.contains(&"[DRY RUN] mkfs.ntfs -Q -L STORAGE /dev/sdb1".to_string()));
        assert!(lines.contains(&"[DRY RUN] mkfs.vfat -F 32 -n EFI /dev/sdb2".to_string()));
        assert!(lines.contains(&"[DRY RUN] mkfs.ext4 -F -L SYSTEM /dev/sdb3".to_string()));
        assert!(lines.last().unwrap().contains("grub-install --target=x86_64-efi"));
        assert!(platform.take_dry_run_log().is_empty());
    }
}
