use super::sizing::{SizingError, compute_sizes};
use super::{PartitionPlan, SLOT_COUNT, SlotKind};
use crate::ui::prelude::*;
use crate::usb::MibSize;

/// Result of checking the sizes typed into the sizing form. Every variant
/// except `Unchanged` carries advice for the user and means the form has to
/// be shown again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Unchanged,
    Adjusted(String),
    Rescaled(String),
    EspTooLarge(String),
    SizingFailed(String),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Unchanged)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ValidationOutcome::Unchanged => None,
            ValidationOutcome::Adjusted(m)
            | ValidationOutcome::Rescaled(m)
            | ValidationOutcome::EspTooLarge(m)
            | ValidationOutcome::SizingFailed(m) => Some(m),
        }
    }
}

/// Reconcile user supplied sizes, one per enabled slot in slot order, with
/// the plan.
///
/// Values are compared in their displayed form, so "3.1G" for a 3180 MiB
/// slot counts as untouched. Changed values are clamped, free space absorbs
/// whatever difference it can, and if the result still does not fill the
/// device exactly the sizes are rescaled.
pub fn validate<S: AsRef<str>>(user_sizes: &[S], plan: &mut PartitionPlan) -> ValidationOutcome {
    let enabled: Vec<usize> = plan
        .slots
        .iter()
        .filter(|s| s.enabled)
        .map(|s| s.kind.index())
        .collect();

    let mut advice: Vec<String> = Vec::new();
    let mut unchanged = user_sizes.len() == enabled.len();
    let mut new_sizes = [0u64; SLOT_COUNT];

    for (pos, &i) in enabled.iter().enumerate() {
        let slot = &plan.slots[i];
        let shown = MibSize::new(slot.size_mib).to_string();
        let input = user_sizes.get(pos).map(|s| s.as_ref().trim());

        match input.and_then(MibSize::parse) {
            Some(size) if size.to_string() == shown => new_sizes[i] = slot.size_mib,
            Some(size) => {
                unchanged = false;
                new_sizes[i] = size.in_mib();
            }
            None => {
                unchanged = false;
                new_sizes[i] = slot.size_mib;
                advice.push(format!(
                    "{}: could not read size '{}'",
                    slot.name,
                    input.unwrap_or_default()
                ));
            }
        }
    }

    if unchanged {
        emit(Level::Debug, "validate.check", "Sizes accepted unchanged", None);
        return ValidationOutcome::Unchanged;
    }

    let usable = plan.usable_mib();
    for &i in &enabled {
        let slot = &plan.slots[i];
        if new_sizes[i] > usable {
            new_sizes[i] = usable / 2;
            advice.push(format!("{} exceeded disk space", slot.name));
        }
        if new_sizes[i] < slot.min_size_mib {
            new_sizes[i] = slot.min_size_mib;
            advice.push(format!("{} was too small", slot.name));
        }
    }

    let mut sum: u64 = enabled.iter().map(|&i| new_sizes[i]).sum();

    let free = SlotKind::FreeSpace.index();
    if plan.slots[free].enabled {
        if sum > usable {
            let excess = sum - usable;
            let shrunk = new_sizes[free].checked_sub(excess);
            if let Some(shrunk) = shrunk.filter(|s| *s >= plan.slots[free].min_size_mib) {
                new_sizes[free] = shrunk;
                sum = usable;
            }
        } else if sum < usable {
            new_sizes[free] += usable - sum;
            sum = usable;
        }
    }

    emit(
        Level::Debug,
        "validate.clamp",
        &format!("Clamped sizes sum to {} of {} usable MiB", sum, usable),
        Some(serde_json::json!({ "sizes": new_sizes })),
    );

    if sum == usable {
        for &i in &enabled {
            plan.slots[i].size_mib = new_sizes[i];
        }
        advice.push("Press next to accept changes".to_string());
        return ValidationOutcome::Adjusted(advice.join("\n"));
    }

    // The clamped sizes are fed back in as weights; the ESP entry is taken as
    // an absolute size again.
    match compute_sizes(&new_sizes, plan) {
        Ok(()) => {
            advice.push("partitions scaled to fit disk size".to_string());
            ValidationOutcome::Rescaled(advice.join("\n"))
        }
        Err(SizingError::InsufficientSpace { .. }) => {
            advice.push(format!(
                "{} size of {} leaves too little room for the other partitions",
                plan.slot(SlotKind::Esp).name,
                MibSize::new(new_sizes[SlotKind::Esp.index()])
            ));
            ValidationOutcome::EspTooLarge(advice.join("\n"))
        }
        Err(e) => {
            advice.push(format!("could not size partitions: {}", e));
            ValidationOutcome::SizingFailed(advice.join("\n"))
        }
    }
}
