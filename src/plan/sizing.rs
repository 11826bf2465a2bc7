use thiserror::Error;

use super::{GPT_OVERHEAD_MIB, PartitionPlan, SLOT_COUNT, SlotKind};
use crate::ui::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizingError {
    #[error("no flexible partition selected")]
    NoFlexiblePartitions,
    #[error("not enough space: {required_mib} MiB needed, {available_mib} MiB available")]
    InsufficientSpace { available_mib: u64, required_mib: u64 },
}

/// Distribute the device between the enabled slots.
///
/// `weights` is indexed like the plan's slots. The ESP entry is an absolute
/// size in MiB; the other entries are relative weights for the space left
/// after the ESP and the GPT overhead. The weighted slots always add up to
/// exactly that space: slots that would end below their minimum are pinned
/// to it, and the MiB lost to rounding are handed out one at a time.
///
/// Pinning means a slot is not always `floor(weight * available / ratio)`.
/// Once a slot is pinned the others share what is left, so every enabled
/// slot ends at or above its minimum.
pub fn compute_sizes(
    weights: &[u64; SLOT_COUNT],
    plan: &mut PartitionPlan,
) -> Result<(), SizingError> {
    let esp_fixed = weights[SlotKind::Esp.index()];

    let eligible: Vec<usize> = plan
        .slots
        .iter()
        .filter(|s| s.enabled && s.kind.is_weighted())
        .map(|s| s.kind.index())
        .collect();

    let ratio: u64 = eligible.iter().map(|&i| weights[i]).sum();
    if ratio == 0 {
        emit(
            Level::Debug,
            "sizing.compute",
            "No weighted slot enabled",
            None,
        );
        return Err(SizingError::NoFlexiblePartitions);
    }

    let required: u64 = eligible.iter().map(|&i| plan.slots[i].min_size_mib).sum();
    let reserved = esp_fixed.saturating_add(GPT_OVERHEAD_MIB);
    let available = plan.total_mib().saturating_sub(reserved);
    if plan.total_mib() < reserved || available < required {
        emit(
            Level::Debug,
            "sizing.compute",
            &format!("{} MiB available, {} MiB required", available, required),
            None,
        );
        return Err(SizingError::InsufficientSpace {
            available_mib: available,
            required_mib: required,
        });
    }

    let mut sizes = [0u64; SLOT_COUNT];
    let mut pinned = [false; SLOT_COUNT];

    loop {
        let open: Vec<usize> = eligible.iter().copied().filter(|&i| !pinned[i]).collect();
        let pinned_total: u64 = eligible
            .iter()
            .filter(|&&i| pinned[i])
            .map(|&i| sizes[i])
            .sum();
        let pool = available - pinned_total;
        let open_ratio: u64 = open.iter().map(|&i| weights[i]).sum();

        for &i in &open {
            sizes[i] = share(weights[i], pool, open_ratio);
        }

        let short: Vec<usize> = open
            .into_iter()
            .filter(|&i| sizes[i] < plan.slots[i].min_size_mib)
            .collect();
        if short.is_empty() {
            break;
        }
        for i in short {
            pinned[i] = true;
            sizes[i] = plan.slots[i].min_size_mib;
        }
    }

    let assigned: u64 = eligible.iter().map(|&i| sizes[i]).sum();
    let remainder = available - assigned;
    for &i in eligible.iter().cycle().take(remainder as usize) {
        sizes[i] += 1;
    }

    for &i in &eligible {
        plan.slots[i].size_mib = sizes[i];
    }
    let esp = plan.slot_mut(SlotKind::Esp);
    if esp.enabled {
        esp.size_mib = esp_fixed;
    }

    emit(
        Level::Debug,
        "sizing.compute",
        &format!(
            "Sized {} MiB across {} slots (ratio {}, remainder {})",
            available,
            eligible.len(),
            ratio,
            remainder
        ),
        Some(serde_json::json!({ "sizes": sizes, "esp_mib": esp_fixed })),
    );
    Ok(())
}

fn share(weight: u64, pool: u64, ratio: u64) -> u64 {
    if ratio == 0 {
        return 0;
    }
    (weight as u128 * pool as u128 / ratio as u128) as u64
}
