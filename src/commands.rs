use anyhow::{Context, Result};
use colored::*;

use crate::config::Config;
use crate::execution::CommandExecutor;
use crate::plan::{PartitionPlan, assemble, compute_sizes, detect_device};
use crate::ui::{self, prelude::*};
use crate::usb::types::MIB;
use crate::usb::{DeviceGeometry, MibSize, probe};
use crate::wizard::steps::plan_summary;
use crate::wizard::{
    DialogRenderer, HostPlatform, StepController, WizardContext, WizardExit,
};

pub struct PlanArgs {
    pub device: Option<String>,
    pub size: Option<String>,
    pub sector_size: u64,
    pub storage: bool,
    pub system: bool,
    pub free: bool,
}

pub fn handle_wizard(config: Config, dry_run: bool) -> Result<()> {
    let platform = HostPlatform::new(
        CommandExecutor::new(dry_run),
        config.filesystems.storage,
        config.bootloader.clone(),
    );
    let backtitle = if dry_run {
        format!("bootstick {} (dry run)", env!("CARGO_PKG_VERSION"))
    } else {
        format!("bootstick {}", env!("CARGO_PKG_VERSION"))
    };
    let renderer = DialogRenderer::new(backtitle);
    let mut controller = StepController::new(WizardContext::new(config, renderer, platform));

    ui::set_quiet(true);
    let result = controller.run();
    ui::set_quiet(false);

    if dry_run {
        report_dry_run(&controller.context().platform.take_dry_run_log())?;
    }

    match result? {
        WizardExit::Completed => {
            let device = controller
                .context()
                .state
                .selected_device
                .clone()
                .unwrap_or_default();
            emit(
                Level::Success,
                "wizard.complete",
                &format!("{} is ready", device),
                None,
            );
        }
        WizardExit::UserQuit => {
            emit(Level::Info, "wizard.quit", "Wizard cancelled", None);
        }
    }
    Ok(())
}

/// Show the commands a dry run skipped while dialog owned the terminal
fn report_dry_run(lines: &[String]) -> Result<()> {
    match get_output_format() {
        OutputFormat::Json => {
            let report = serde_json::json!({ "dry_run": lines });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            if lines.is_empty() {
                println!("{}", "[DRY RUN] no device commands were reached".dimmed());
            }
            for line in lines {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

pub fn handle_devices() -> Result<()> {
    let devices = probe::list_usb_devices()?;

    match get_output_format() {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&devices)?);
        }
        OutputFormat::Text => {
            if devices.is_empty() {
                emit(Level::Warn, "devices.list", "No removable USB device found", None);
            }
            for device in &devices {
                println!("{}  {}", device.path.bold(), device.label());
            }
        }
    }
    Ok(())
}

fn plan_geometry(args: &PlanArgs) -> Result<DeviceGeometry> {
    if let Some(device) = &args.device {
        return probe::read_geometry(device);
    }
    let size = args.size.as_deref().context("Either --device or --size is required")?;
    let mib = MibSize::parse(size).with_context(|| format!("Invalid size '{}'", size))?;
    let total_bytes = mib
        .in_mib()
        .checked_mul(MIB)
        .with_context(|| format!("Size '{}' is too large", size))?;
    Ok(DeviceGeometry {
        total_bytes,
        sector_size: args.sector_size,
    })
}

pub fn handle_plan(config: &Config, args: PlanArgs) -> Result<()> {
    let geometry = plan_geometry(&args)?;
    let mut plan = PartitionPlan::new(geometry, config);
    plan.select(args.storage, args.system, args.free);
    compute_sizes(&config.sizing.weights(), &mut plan)?;
    let script = assemble(&plan)?;

    match get_output_format() {
        OutputFormat::Json => {
            let report = serde_json::json!({ "plan": plan, "script": script });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("{}", plan_summary(&plan));
            println!();
            print!("{}", script);
        }
    }
    Ok(())
}

pub fn handle_detect(config: &Config, device: &str) -> Result<()> {
    let geometry = probe::read_geometry(device)?;
    let template = PartitionPlan::new(geometry, config);
    let detection = detect_device(device, &template)?;

    match get_output_format() {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "device": device,
                "compatible": detection.flags.is_compatible(),
                "flags": detection.flags,
                "plan": detection.plan,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            if detection.flags.is_compatible() {
                emit(
                    Level::Success,
                    "detect.report",
                    &format!("{}: layout can be reused", device),
                    None,
                );
                println!("{}", plan_summary(&detection.plan));
            } else {
                emit(
                    Level::Warn,
                    "detect.report",
                    &format!("{}: {}", device, detection.flags),
                    None,
                );
            }
        }
    }
    Ok(())
}

pub fn handle_config(config: &Config) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
