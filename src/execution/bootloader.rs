use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{CommandExecutor, cleanup};
use crate::config::BootloaderConfig;
use crate::plan::{PartitionPlan, SlotKind};
use crate::ui::prelude::*;

/// Mount `node` on a fresh temporary directory
fn mount_node(node: &str, prefix: &str, executor: &CommandExecutor) -> Result<PathBuf> {
    let dir = cleanup::temp_dir(prefix)?;
    executor
        .run(Command::new("mount").arg(node).arg(&dir))
        .with_context(|| format!("Failed to mount {}", node))?;
    if !executor.dry_run {
        cleanup::register_mount(&dir);
    }
    Ok(dir)
}

pub fn grub_install_command(
    target: &str,
    efi_dir: &Path,
    boot_dir: &Path,
    bootloader_id: &str,
) -> Command {
    let mut cmd = Command::new("grub-install");
    cmd.arg(format!("--target={}", target))
        .arg(format!("--efi-directory={}", efi_dir.display()))
        .arg(format!("--boot-directory={}", boot_dir.display()))
        .arg(format!("--bootloader-id={}", bootloader_id))
        .arg("--removable")
        .arg("--no-nvram");
    cmd
}

/// Entry config that hands over to whatever the system partition provides
pub fn grub_config(system_label: &str) -> String {
    format!(
        "search --no-floppy --label --set=root {}\n\
         if [ -f /boot/grub/custom.cfg ]; then\n    \
         source /boot/grub/custom.cfg\n\
         fi\n",
        system_label
    )
}

/// Install GRUB onto the stick. Without a system partition the boot files
/// go onto the ESP.
pub fn install_bootloader(
    plan: &PartitionPlan,
    config: &BootloaderConfig,
    executor: &CommandExecutor,
) -> Result<()> {
    let esp = plan.slot(SlotKind::Esp);
    let esp_node = esp
        .node
        .as_deref()
        .filter(|_| esp.enabled)
        .context("EFI system partition has no device node")?;

    let system = plan.slot(SlotKind::System);
    let system_node = system.node.as_deref().filter(|_| system.enabled);

    let esp_dir = mount_node(esp_node, "bootstick-esp", executor)?;
    let root_dir = match system_node {
        Some(node) => mount_node(node, "bootstick-system", executor)?,
        None => esp_dir.clone(),
    };
    let boot_dir = root_dir.join("boot");

    if !executor.dry_run {
        fs::create_dir_all(&boot_dir)
            .with_context(|| format!("creating {}", boot_dir.display()))?;
    }

    for target in &config.targets {
        emit(
            Level::Info,
            "bootloader.install",
            &format!("Installing GRUB for {}", target),
            None,
        );
        executor
            .run(&mut grub_install_command(
                target,
                &esp_dir,
                &boot_dir,
                &config.bootloader_id,
            ))
            .with_context(|| format!("grub-install for {} failed", target))?;
    }

    let grub_cfg = boot_dir.join("grub").join("grub.cfg");
    if !executor.dry_run && !grub_cfg.exists() {
        let label = if system_node.is_some() {
            &system.name
        } else {
            &esp.name
        };
        fs::write(&grub_cfg, grub_config(label))
            .with_context(|| format!("writing {}", grub_cfg.display()))?;
    }

    if !executor.dry_run {
        if system_node.is_some() {
            cleanup::release_mount(&root_dir)?;
        }
        cleanup::release_mount(&esp_dir)?;
    }

    Ok(())
}
