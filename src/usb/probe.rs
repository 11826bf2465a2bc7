//! Read-only queries against block devices

use anyhow::{Context, Result};
use serde_json::Value;
use std::process::Command;

use super::types::{DeviceGeometry, PartitionInfo, UsbDevice};

const DEVICE_COLUMNS: &str = "NAME,PATH,SIZE,RM,RO,TRAN,TYPE,VENDOR,MODEL";
const PARTITION_COLUMNS: &str = "NAME,PATH,SIZE,TYPE,FSTYPE,PARTTYPE,PARTLABEL,MOUNTPOINT";

fn run_lsblk(args: &[&str]) -> Result<Value> {
    let output = Command::new("lsblk")
        .args(args)
        .output()
        .context("Failed to run lsblk")?;

    if !output.status.success() {
        anyhow::bail!("lsblk failed: {}", String::from_utf8_lossy(&output.stderr));
    }

    serde_json::from_slice(&output.stdout).context("Failed to parse lsblk JSON output")
}

/// Removable, writable disks attached over USB
pub fn list_usb_devices() -> Result<Vec<UsbDevice>> {
    let json = run_lsblk(&["-J", "-b", "-d", "-o", DEVICE_COLUMNS])?;
    parse_usb_devices(&json)
}

pub fn parse_usb_devices(json: &Value) -> Result<Vec<UsbDevice>> {
    let blockdevices = json
        .get("blockdevices")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("No blockdevices in lsblk output"))?;

    let mut devices = Vec::new();
    for device in blockdevices {
        if text(device, "type").as_deref() != Some("disk") {
            continue;
        }
        if !flag(device, "rm") || flag(device, "ro") {
            continue;
        }
        if text(device, "tran").as_deref() != Some("usb") {
            continue;
        }

        let Some(path) = text(device, "path").or_else(|| {
            text(device, "name").map(|name| format!("/dev/{}", name))
        }) else {
            continue;
        };

        devices.push(UsbDevice {
            path,
            vendor: text(device, "vendor"),
            model: text(device, "model"),
            size_bytes: number(device, "size"),
        });
    }

    Ok(devices)
}

/// Total size and logical sector size of a device
pub fn read_geometry(device: &str) -> Result<DeviceGeometry> {
    let total_bytes = blockdev(device, "--getsize64")?;
    let sector_size = blockdev(device, "--getss")?;

    if sector_size == 0 || !sector_size.is_power_of_two() {
        anyhow::bail!("{} reports an invalid sector size of {}", device, sector_size);
    }

    Ok(DeviceGeometry {
        total_bytes,
        sector_size,
    })
}

fn blockdev(device: &str, query: &str) -> Result<u64> {
    let output = Command::new("blockdev")
        .args([query, device])
        .output()
        .with_context(|| format!("Failed to run blockdev {} {}", query, device))?;

    if !output.status.success() {
        anyhow::bail!(
            "blockdev {} {} failed: {}",
            query,
            device,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<u64>()
        .with_context(|| format!("Unexpected blockdev {} output for {}", query, device))
}

/// Partitions currently present on a device
pub fn list_partitions(device: &str) -> Result<Vec<PartitionInfo>> {
    let json = run_lsblk(&["-J", "-b", "-o", PARTITION_COLUMNS, device])?;
    Ok(parse_partitions(&json))
}

/// Flatten the lsblk tree into the partitions below the disk
pub fn parse_partitions(json: &Value) -> Vec<PartitionInfo> {
    let mut partitions = Vec::new();
    let Some(blockdevices) = json.get("blockdevices").and_then(|v| v.as_array()) else {
        return partitions;
    };

    for device in blockdevices {
        collect_partitions(device, &mut partitions);
    }
    partitions
}

fn collect_partitions(value: &Value, out: &mut Vec<PartitionInfo>) {
    if let Some(partition) = parse_partition(value) {
        out.push(partition);
    }
    if let Some(children) = value.get("children").and_then(|v| v.as_array()) {
        for child in children {
            collect_partitions(child, out);
        }
    }
}

pub fn parse_partition(value: &Value) -> Option<PartitionInfo> {
    let kind = text(value, "type")?;
    if kind != "part" {
        return None;
    }
    let name = text(value, "name")?;
    let path = text(value, "path").unwrap_or_else(|| format!("/dev/{}", name));

    Some(PartitionInfo {
        name,
        path,
        kind,
        part_type: text(value, "parttype").map(|s| s.to_lowercase()),
        label: text(value, "partlabel"),
        fs_type: text(value, "fstype"),
        size_bytes: number(value, "size"),
        mountpoint: text(value, "mountpoint"),
    })
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

// Older util-linux releases print numbers and flags as strings
fn number(value: &Value, key: &str) -> u64 {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn flag(value: &Value, key: &str) -> bool {
    match value.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_u64() == Some(1),
        Some(Value::String(s)) => s.trim() == "1",
        _ => false,
    }
}
