pub mod probe;
pub mod types;

pub use types::{DeviceGeometry, MibSize, PartitionInfo};

/// Device node of the n-th partition (1-based) on `disk`
pub fn part_path(disk: &str, part_num: usize) -> String {
    if disk.chars().last().unwrap_or(' ').is_ascii_digit() {
        format!("{}p{}", disk, part_num)
    } else {
        format!("{}{}", disk, part_num)
    }
}
