//! One handler per wizard step. Handlers render through the context's
//! renderer, update the state and return what the user asked for.

use anyhow::{Context, Result};

use super::context::WizardContext;
use super::outcome::{Step, StepOutcome};
use super::platform::Platform;
use super::renderer::{CheckItem, FormField, MenuItem, StepRenderer};
use crate::plan::{PartitionPlan, SizingError, SlotKind, assemble, compute_sizes, detect, validate};
use crate::ui::prelude::*;
use crate::usb::MibSize;

const KEEP_TAG: &str = "keep";
const FORMAT_TAG: &str = "format";

pub fn run_step<R: StepRenderer, P: Platform>(
    ctx: &mut WizardContext<R, P>,
    step: Step,
) -> Result<StepOutcome> {
    match step {
        Step::SelectDevice => select_device(ctx),
        Step::FormatOrKeep => format_or_keep(ctx),
        Step::SelectSlots => select_slots(ctx),
        Step::Sizing => sizing(ctx),
        Step::Confirm => confirm(ctx),
        Step::Install => install(ctx),
        Step::Done => done(ctx),
    }
}

/// One line per enabled slot, e.g. "STORAGE  3.1 GiB"
pub fn plan_summary(plan: &PartitionPlan) -> String {
    plan.enabled_slots()
        .map(|slot| {
            let mut line = format!("{:<12} {}", slot.name, MibSize::new(slot.size_mib));
            if let Some(node) = &slot.node {
                line.push_str(&format!(" ({})", node));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn selected_device<R, P>(ctx: &WizardContext<R, P>) -> Result<String> {
    ctx.state
        .selected_device
        .clone()
        .context("No device selected")
}

fn plan_mut<R, P>(ctx: &mut WizardContext<R, P>) -> Result<&mut PartitionPlan> {
    ctx.state.plan.as_mut().context("No partition plan")
}

fn select_device<R: StepRenderer, P: Platform>(ctx: &mut WizardContext<R, P>) -> Result<StepOutcome> {
    let step = Step::SelectDevice;
    let devices = ctx.platform.usb_devices()?;

    if devices.is_empty() {
        let text = ctx
            .state
            .take_text("No removable USB device found.\n\nPlug one in and scan again?");
        return Ok(match ctx.renderer.confirm(step, &text)? {
            StepOutcome::Advance => StepOutcome::Repeat,
            other => other,
        });
    }

    let items: Vec<MenuItem> = devices
        .iter()
        .map(|(path, label)| MenuItem::new(path, label))
        .collect();
    let text = ctx
        .state
        .take_text("Select the USB device to prepare. Everything on it may be erased.");
    let reply = ctx.renderer.menu(step, &text, &items)?;
    if reply.outcome != StepOutcome::Advance {
        return Ok(reply.outcome);
    }

    let Some(device) = reply.value.filter(|d| devices.contains_key(d)) else {
        ctx.state.user_message = "Select one of the listed devices".to_string();
        return Ok(StepOutcome::Repeat);
    };

    if ctx.state.selected_device.as_deref() != Some(device.as_str()) || ctx.state.plan.is_none() {
        let geometry = ctx
            .platform
            .geometry(&device)
            .with_context(|| format!("Failed to read the geometry of {}", device))?;
        emit(
            Level::Info,
            "controller.device",
            &format!(
                "Selected {} ({} bytes, {} byte sectors)",
                device, geometry.total_bytes, geometry.sector_size
            ),
            None,
        );
        ctx.state.plan = Some(PartitionPlan::new(geometry, &ctx.config));
        ctx.state.selected_device = Some(device);
        ctx.state.keep_existing = false;
    }

    Ok(StepOutcome::Advance)
}

fn format_or_keep<R: StepRenderer, P: Platform>(ctx: &mut WizardContext<R, P>) -> Result<StepOutcome> {
    let step = Step::FormatOrKeep;
    let device = selected_device(ctx)?;
    let partitions = ctx.platform.partitions(&device)?;
    let geometry = plan_mut(ctx)?.geometry;
    let fresh = PartitionPlan::new(geometry, &ctx.config);
    let detection = detect(&partitions, &fresh);

    if detection.flags.is_compatible() {
        let items = [
            MenuItem::new(KEEP_TAG, "Keep the existing partitions, only reinstall the bootloader"),
            MenuItem::new(FORMAT_TAG, "Erase the device and create new partitions"),
        ];
        let text = ctx
            .state
            .take_text(&format!("{} already has a usable layout.", device));
        let reply = ctx.renderer.menu(step, &text, &items)?;
        if reply.outcome != StepOutcome::Advance {
            return Ok(reply.outcome);
        }

        match reply.value.as_deref() {
            Some(KEEP_TAG) => {
                ctx.state.keep_existing = true;
                ctx.state.plan = Some(detection.plan);
            }
            Some(FORMAT_TAG) => {
                ctx.state.keep_existing = false;
                ctx.state.plan = Some(fresh);
            }
            _ => {
                ctx.state.user_message = "Choose whether to keep or erase the device".to_string();
                return Ok(StepOutcome::Repeat);
            }
        }
        return Ok(StepOutcome::Advance);
    }

    let text = ctx.state.take_text(&format!(
        "The layout on {} can't be reused: {}.\n\nContinuing erases everything on the device.",
        device, detection.flags
    ));
    let outcome = ctx.renderer.confirm(step, &text)?;
    if outcome == StepOutcome::Advance {
        ctx.state.keep_existing = false;
        ctx.state.plan = Some(fresh);
    }
    Ok(outcome)
}

fn select_slots<R: StepRenderer, P: Platform>(ctx: &mut WizardContext<R, P>) -> Result<StepOutcome> {
    let step = Step::SelectSlots;
    let plan = plan_mut(ctx)?;
    // Nothing picked yet: suggest storage plus system
    let suggest = !plan.has_weighted_slot();
    let items: Vec<CheckItem> = SlotKind::ALL
        .into_iter()
        .filter(|kind| kind.is_weighted())
        .map(|kind| {
            let slot = plan.slot(kind);
            CheckItem {
                tag: kind.tag().to_string(),
                label: slot.name.clone(),
                on: slot.enabled || (suggest && kind != SlotKind::FreeSpace),
            }
        })
        .collect();

    let text = ctx.state.take_text(
        "Choose the partitions to create. An EFI system partition is always added.",
    );
    let reply = ctx.renderer.checklist(step, &text, &items)?;
    if reply.outcome != StepOutcome::Advance {
        return Ok(reply.outcome);
    }

    let picked = |kind: SlotKind| reply.value.iter().any(|tag| tag == kind.tag());
    let weights = ctx.config.sizing.weights();
    let plan = plan_mut(ctx)?;
    plan.select(
        picked(SlotKind::Storage),
        picked(SlotKind::System),
        picked(SlotKind::FreeSpace),
    );

    match compute_sizes(&weights, plan) {
        Ok(()) => Ok(StepOutcome::Advance),
        Err(SizingError::NoFlexiblePartitions) => {
            ctx.state.user_message =
                "Select at least one partition besides the EFI system partition".to_string();
            Ok(StepOutcome::Repeat)
        }
        Err(e @ SizingError::InsufficientSpace { .. }) => {
            ctx.state.user_message = format!("The device is too small for this selection, {}", e);
            Ok(StepOutcome::Repeat)
        }
    }
}

fn sizing<R: StepRenderer, P: Platform>(ctx: &mut WizardContext<R, P>) -> Result<StepOutcome> {
    let step = Step::Sizing;
    let plan = plan_mut(ctx)?;
    let fields: Vec<FormField> = plan
        .enabled_slots()
        .map(|slot| FormField {
            label: slot.name.clone(),
            value: MibSize::new(slot.size_mib).to_string(),
        })
        .collect();
    let usable = MibSize::new(plan.usable_mib());

    let text = ctx.state.take_text(&format!(
        "Adjust the partition sizes ({} usable). Sizes take K, M, G or T suffixes.",
        usable
    ));
    let reply = ctx.renderer.form(step, &text, &fields)?;
    if reply.outcome != StepOutcome::Advance {
        return Ok(reply.outcome);
    }

    let outcome = validate(&reply.value, plan_mut(ctx)?);
    if outcome.is_accepted() {
        return Ok(StepOutcome::Advance);
    }

    let message = outcome.message().unwrap_or_default().to_string();
    emit(Level::Debug, "validate.result", &message, None);
    ctx.state.user_message = message;
    Ok(StepOutcome::Repeat)
}

fn confirm<R: StepRenderer, P: Platform>(ctx: &mut WizardContext<R, P>) -> Result<StepOutcome> {
    let device = selected_device(ctx)?;
    let summary = plan_summary(plan_mut(ctx)?);
    let action = if ctx.state.keep_existing {
        format!("The bootloader will be reinstalled on {}.", device)
    } else {
        format!("{} will be erased and partitioned as follows:", device)
    };
    let text = ctx.state.take_text(&format!("{}\n\n{}", action, summary));
    ctx.renderer.confirm(Step::Confirm, &text)
}

fn install<R: StepRenderer, P: Platform>(ctx: &mut WizardContext<R, P>) -> Result<StepOutcome> {
    let step = Step::Install;
    let device = selected_device(ctx)?;
    let mut plan = ctx.state.plan.take().context("No partition plan")?;

    let result = install_plan(ctx, step, &device, &mut plan);
    ctx.state.plan = Some(plan);
    result?;

    emit(
        Level::Success,
        "controller.install",
        &format!("{} prepared", device),
        None,
    );
    Ok(StepOutcome::Advance)
}

fn install_plan<R: StepRenderer, P: Platform>(
    ctx: &mut WizardContext<R, P>,
    step: Step,
    device: &str,
    plan: &mut PartitionPlan,
) -> Result<()> {
    if !ctx.state.keep_existing {
        ctx.renderer
            .progress(step, &format!("Releasing {}...", device))?;
        ctx.platform.release(device)?;

        let script = assemble(plan).context("Failed to build the partition table")?;
        ctx.renderer
            .progress(step, "Writing partition table...")?;
        ctx.platform.write_table(device, &script, plan)?;

        ctx.renderer.progress(step, "Creating filesystems...")?;
        ctx.platform.format(plan)?;
    }

    ctx.renderer.progress(step, "Installing bootloader...")?;
    ctx.platform.install_bootloader(plan)
}

fn done<R: StepRenderer, P: Platform>(ctx: &mut WizardContext<R, P>) -> Result<StepOutcome> {
    let device = selected_device(ctx)?;
    emit(
        Level::Info,
        "controller.done",
        &format!("Finished preparing {}", device),
        None,
    );
    let text = ctx
        .state
        .take_text(&format!("{} is ready. It can be removed now.", device));
    ctx.renderer.message(Step::Done, &text)
}
