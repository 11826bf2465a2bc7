use thiserror::Error;

use super::context::WizardContext;
use super::outcome::{Step, StepOutcome};
use super::platform::Platform;
use super::renderer::StepRenderer;
use super::steps;
use crate::ui::prelude::*;

#[derive(Debug, Error)]
pub enum ControllerAbort {
    #[error("{step} returned unknown result code {code}")]
    UnknownOutcome { step: Step, code: i32 },
    #[error("{step} failed: {error:#}")]
    StepFailed { step: Step, error: anyhow::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardExit {
    Completed,
    UserQuit,
}

/// Drives the wizard from device selection to the final message
pub struct StepController<R, P> {
    ctx: WizardContext<R, P>,
}

impl<R: StepRenderer, P: Platform> StepController<R, P> {
    pub fn new(ctx: WizardContext<R, P>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &WizardContext<R, P> {
        &self.ctx
    }

    #[cfg(test)]
    pub fn into_context(self) -> WizardContext<R, P> {
        self.ctx
    }

    /// Steps 3 and 4 only apply to a fresh layout
    fn applies(&self, step: Step) -> bool {
        !(self.ctx.state.keep_existing && matches!(step, Step::SelectSlots | Step::Sizing))
    }

    fn forward(&self, from: Step) -> Step {
        let mut step = from;
        while let Some(next) = step.next() {
            step = next;
            if self.applies(step) {
                break;
            }
        }
        step
    }

    fn backward(&self, from: Step) -> Step {
        let mut step = from;
        while let Some(previous) = step.previous() {
            step = previous;
            if self.applies(step) {
                return step;
            }
        }
        Step::SelectDevice
    }

    pub fn run(&mut self) -> Result<WizardExit, ControllerAbort> {
        loop {
            let step = self.ctx.state.current_step;
            emit(
                Level::Debug,
                "controller.step",
                &format!("Entering {}", step),
                Some(serde_json::json!({ "step": step.number(), "code": step.code() })),
            );

            let outcome = steps::run_step(&mut self.ctx, step)
                .map_err(|error| ControllerAbort::StepFailed { step, error })?;
            log::debug!(target: "controller.step", "{} -> {:?}", step, outcome);

            self.ctx.state.current_step = match outcome {
                StepOutcome::Abort(code) => {
                    emit(
                        Level::Error,
                        "controller.abort",
                        &format!("{} returned unknown result code {}", step, code),
                        None,
                    );
                    return Err(ControllerAbort::UnknownOutcome { step, code });
                }
                _ if step == Step::Done => return Ok(WizardExit::Completed),
                StepOutcome::Advance => self.forward(step),
                StepOutcome::Repeat => step,
                StepOutcome::Back => self.backward(step),
                StepOutcome::Quit => {
                    emit(Level::Info, "controller.quit", &format!("Quit at {}", step), None);
                    return Ok(WizardExit::UserQuit);
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::execution::disk;
    use crate::plan::{PartitionPlan, SlotKind, partition_types};
    use crate::usb::types::MIB;
    use crate::usb::{DeviceGeometry, PartitionInfo};
    use crate::wizard::renderer::{CheckItem, FormField, MenuItem, Reply};
    use anyhow::Result;
    use std::collections::{BTreeMap, VecDeque};

    enum Scripted {
        Menu(StepOutcome, Option<&'static str>),
        Check(StepOutcome, Vec<&'static str>),
        /// None hands the prefilled values back
        Form(StepOutcome, Option<Vec<&'static str>>),
        Confirm(StepOutcome),
        Message(StepOutcome),
    }

    struct ScriptedRenderer {
        replies: VecDeque<Scripted>,
        shown: Vec<(Step, String)>,
    }

    impl ScriptedRenderer {
        fn new(replies: Vec<Scripted>) -> Self {
            Self {
                replies: replies.into(),
                shown: Vec::new(),
            }
        }

        fn next(&mut self, step: Step, text: &str) -> Scripted {
            self.shown.push((step, text.to_string()));
            self.replies
                .pop_front()
                .unwrap_or_else(|| panic!("no scripted reply left for {}", step))
        }

        fn steps(&self) -> Vec<Step> {
            let mut steps: Vec<Step> = self.shown.iter().map(|(s, _)| *s).collect();
            steps.dedup();
            steps
        }
    }

    impl StepRenderer for ScriptedRenderer {
        fn menu(&mut self, step: Step, text: &str, _items: &[MenuItem]) -> Result<Reply<Option<String>>> {
            match self.next(step, text) {
                Scripted::Menu(outcome, tag) => Ok(Reply::new(outcome, tag.map(String::from))),
                _ => panic!("unexpected menu at {}", step),
            }
        }

        fn checklist(&mut self, step: Step, text: &str, _items: &[CheckItem]) -> Result<Reply<Vec<String>>> {
            match self.next(step, text) {
                Scripted::Check(outcome, tags) => {
                    Ok(Reply::new(outcome, tags.into_iter().map(String::from).collect()))
                }
                _ => panic!("unexpected checklist at {}", step),
            }
        }

        fn form(&mut self, step: Step, text: &str, fields: &[FormField]) -> Result<Reply<Vec<String>>> {
            match self.next(step, text) {
                Scripted::Form(outcome, Some(values)) => {
                    Ok(Reply::new(outcome, values.into_iter().map(String::from).collect()))
                }
                Scripted::Form(outcome, None) => {
                    Ok(Reply::new(outcome, fields.iter().map(|f| f.value.clone()).collect()))
                }
                _ => panic!("unexpected form at {}", step),
            }
        }

        fn confirm(&mut self, step: Step, text: &str) -> Result<StepOutcome> {
            match self.next(step, text) {
                Scripted::Confirm(outcome) => Ok(outcome),
                _ => panic!("unexpected yes/no at {}", step),
            }
        }

        fn message(&mut self, step: Step, text: &str) -> Result<StepOutcome> {
            match self.next(step, text) {
                Scripted::Message(outcome) => Ok(outcome),
                _ => panic!("unexpected message at {}", step),
            }
        }

        fn progress(&mut self, step: Step, text: &str) -> Result<()> {
            self.shown.push((step, text.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakePlatform {
        devices: BTreeMap<String, String>,
        partitions: Vec<PartitionInfo>,
        fail_on: Option<&'static str>,
        calls: Vec<String>,
        script: Option<String>,
    }

    impl FakePlatform {
        fn with_stick() -> Self {
            let mut platform = Self::default();
            platform
                .devices
                .insert("/dev/sdb".into(), "SanDisk Ultra (7.8 GiB)".into());
            platform
        }

        fn call(&mut self, name: &str, device: Option<&str>) -> Result<()> {
            self.calls.push(match device {
                Some(device) => format!("{} {}", name, device),
                None => name.to_string(),
            });
            if self.fail_on == Some(name) {
                anyhow::bail!("{} exited with status 1", name);
            }
            Ok(())
        }
    }

    impl Platform for FakePlatform {
        fn usb_devices(&mut self) -> Result<BTreeMap<String, String>> {
            self.call("usb_devices", None)?;
            Ok(self.devices.clone())
        }

        fn geometry(&mut self, device: &str) -> Result<DeviceGeometry> {
            self.call("geometry", Some(device))?;
            Ok(DeviceGeometry {
                total_bytes: 8000 * MIB,
                sector_size: 512,
            })
        }

        fn partitions(&mut self, device: &str) -> Result<Vec<PartitionInfo>> {
            self.call("partitions", Some(device))?;
            Ok(self.partitions.clone())
        }

        fn release(&mut self, device: &str) -> Result<()> {
            self.call("release", Some(device))
        }

        fn write_table(&mut self, device: &str, script: &str, plan: &mut PartitionPlan) -> Result<()> {
            self.call("write_table", Some(device))?;
            self.script = Some(script.to_string());
            disk::assign_nodes(device, plan);
            Ok(())
        }

        fn format(&mut self, _plan: &PartitionPlan) -> Result<()> {
            self.call("format", None)
        }

        fn install_bootloader(&mut self, _plan: &PartitionPlan) -> Result<()> {
            self.call("install_bootloader", None)
        }
    }

    fn controller(replies: Vec<Scripted>, platform: FakePlatform) -> StepController<ScriptedRenderer, FakePlatform> {
        StepController::new(WizardContext::new(
            Config::default(),
            ScriptedRenderer::new(replies),
            platform,
        ))
    }

    fn reusable_layout() -> Vec<PartitionInfo> {
        vec![
            PartitionInfo {
                name: "sdb1".into(),
                path: "/dev/sdb1".into(),
                kind: "part".into(),
                part_type: Some(partition_types::EFI_SYSTEM.into()),
                label: Some("EFI".into()),
                fs_type: Some("vfat".into()),
                size_bytes: 100 * MIB,
                mountpoint: None,
            },
            PartitionInfo {
                name: "sdb2".into(),
                path: "/dev/sdb2".into(),
                kind: "part".into(),
                part_type: Some(partition_types::LINUX_FILESYSTEM.into()),
                label: Some("SYSTEM".into()),
                fs_type: Some("ext4".into()),
                size_bytes: 2000 * MIB,
                mountpoint: Some("/run/media/user/SYSTEM".into()),
            },
        ]
    }

    use StepOutcome::*;

    #[test]
    fn test_fresh_install_runs_every_step() {
        let mut wizard = controller(
            vec![
                Scripted::Menu(Advance, Some("/dev/sdb")),
                Scripted::Confirm(Advance),
                Scripted::Check(Advance, vec!["storage", "system", "free"]),
                Scripted::Form(Advance, None),
                Scripted::Confirm(Advance),
                Scripted::Message(Advance),
            ],
            FakePlatform::with_stick(),
        );

        assert_eq!(wizard.run().unwrap(), WizardExit::Completed);

        let ctx = wizard.into_context();
        assert_eq!(ctx.renderer.steps(), Step::ALL.to_vec());
        assert_eq!(
            ctx.platform.calls,
            [
                "usb_devices",
                "geometry /dev/sdb",
                "partitions /dev/sdb",
                "release /dev/sdb",
                "write_table /dev/sdb",
                "format",
                "install_bootloader",
            ]
        );

        let plan = ctx.state.plan.unwrap();
        let sizes: Vec<u64> = plan.slots.iter().map(|s| s.size_mib).collect();
        assert_eq!(sizes, [3180, 50, 3179, 1589]);
        assert_eq!(plan.slot(SlotKind::System).node.as_deref(), Some("/dev/sdb3"));

        let script = ctx.platform.script.unwrap();
        assert!(script.contains("start=2048,size=6512640"));
        assert_eq!(script.matches("start=").count(), 3);
    }

    #[test]
    fn test_back_returns_to_previous_step() {
        let mut wizard = controller(
            vec![
                Scripted::Menu(Advance, Some("/dev/sdb")),
                Scripted::Confirm(Back),
                Scripted::Menu(Advance, Some("/dev/sdb")),
                Scripted::Confirm(Quit),
            ],
            FakePlatform::with_stick(),
        );

        assert_eq!(wizard.run().unwrap(), WizardExit::UserQuit);

        let ctx = wizard.into_context();
        assert_eq!(
            ctx.renderer.steps(),
            [Step::SelectDevice, Step::FormatOrKeep, Step::SelectDevice, Step::FormatOrKeep]
        );
        // same device again, geometry is not re-read
        let reads = ctx.platform.calls.iter().filter(|c| c.starts_with("geometry")).count();
        assert_eq!(reads, 1);
    }

    #[test]
    fn test_back_on_first_step_stays() {
        let mut wizard = controller(
            vec![Scripted::Menu(Back, None), Scripted::Menu(Quit, None)],
            FakePlatform::with_stick(),
        );

        assert_eq!(wizard.run().unwrap(), WizardExit::UserQuit);
        assert_eq!(
            wizard.context().renderer.steps(),
            [Step::SelectDevice]
        );
        assert!(wizard.context().state.selected_device.is_none());
    }

    #[test]
    fn test_rescan_without_devices() {
        let mut wizard = controller(
            vec![Scripted::Confirm(Advance), Scripted::Confirm(Quit)],
            FakePlatform::default(),
        );

        assert_eq!(wizard.run().unwrap(), WizardExit::UserQuit);
        assert_eq!(wizard.context().platform.calls, ["usb_devices", "usb_devices"]);
    }

    #[test]
    fn test_adjusted_sizes_repeat_the_form() {
        let mut wizard = controller(
            vec![
                Scripted::Menu(Advance, Some("/dev/sdb")),
                Scripted::Confirm(Advance),
                Scripted::Check(Advance, vec!["storage", "system", "free"]),
                Scripted::Form(Advance, Some(vec!["3.1 GiB", "50 MiB", "10", "1.6 GiB"])),
                Scripted::Form(Advance, None),
                Scripted::Confirm(Quit),
            ],
            FakePlatform::with_stick(),
        );

        assert_eq!(wizard.run().unwrap(), WizardExit::UserQuit);

        let ctx = wizard.into_context();
        let forms: Vec<&String> = ctx
            .renderer
            .shown
            .iter()
            .filter(|(s, _)| *s == Step::Sizing)
            .map(|(_, t)| t)
            .collect();
        assert_eq!(forms.len(), 2);
        assert!(!forms[0].contains("too small"));
        assert!(forms[1].starts_with("SYSTEM was too small\nPress next to accept changes"));

        let plan = ctx.state.plan.unwrap();
        assert_eq!(plan.slot(SlotKind::System).size_mib, 1000);
        assert_eq!(plan.slot(SlotKind::FreeSpace).size_mib, 3768);
        assert_eq!(plan.allocated_mib(), plan.usable_mib());
        // nothing was written
        assert!(!ctx.platform.calls.iter().any(|c| c.starts_with("write_table")));
    }

    #[test]
    fn test_empty_selection_repeats_with_advice() {
        let mut wizard = controller(
            vec![
                Scripted::Menu(Advance, Some("/dev/sdb")),
                Scripted::Confirm(Advance),
                Scripted::Check(Advance, vec![]),
                Scripted::Check(Quit, vec![]),
            ],
            FakePlatform::with_stick(),
        );

        assert_eq!(wizard.run().unwrap(), WizardExit::UserQuit);

        let (step, text) = wizard.context().renderer.shown.last().unwrap();
        assert_eq!(*step, Step::SelectSlots);
        assert!(text.starts_with("Select at least one partition"));
    }

    #[test]
    fn test_unknown_code_aborts() {
        let mut wizard = controller(
            vec![Scripted::Menu(Abort(7), None)],
            FakePlatform::with_stick(),
        );

        match wizard.run() {
            Err(ControllerAbort::UnknownOutcome { step, code }) => {
                assert_eq!(step, Step::SelectDevice);
                assert_eq!(code, 7);
            }
            other => panic!("expected abort, got {:?}", other),
        }
    }

    #[test]
    fn test_install_failure_aborts() {
        let mut platform = FakePlatform::with_stick();
        platform.fail_on = Some("format");
        let mut wizard = controller(
            vec![
                Scripted::Menu(Advance, Some("/dev/sdb")),
                Scripted::Confirm(Advance),
                Scripted::Check(Advance, vec!["storage", "system"]),
                Scripted::Form(Advance, None),
                Scripted::Confirm(Advance),
            ],
            platform,
        );

        let err = wizard.run().unwrap_err();
        assert!(matches!(err, ControllerAbort::StepFailed { step: Step::Install, .. }));
        assert!(err.to_string().contains("format exited with status 1"));

        let ctx = wizard.into_context();
        assert!(!ctx.platform.calls.contains(&"install_bootloader".to_string()));
        // plan survives the failed install
        assert!(ctx.state.plan.is_some());
    }

    #[test]
    fn test_keep_existing_skips_sizing_steps() {
        let mut platform = FakePlatform::with_stick();
        platform.partitions = reusable_layout();
        let mut wizard = controller(
            vec![
                Scripted::Menu(Advance, Some("/dev/sdb")),
                Scripted::Menu(Advance, Some("keep")),
                Scripted::Confirm(Back),
                Scripted::Menu(Advance, Some("keep")),
                Scripted::Confirm(Advance),
                Scripted::Message(Advance),
            ],
            platform,
        );

        assert_eq!(wizard.run().unwrap(), WizardExit::Completed);

        let ctx = wizard.into_context();
        assert_eq!(
            ctx.renderer.steps(),
            [
                Step::SelectDevice,
                Step::FormatOrKeep,
                Step::Confirm,
                Step::FormatOrKeep,
                Step::Confirm,
                Step::Install,
                Step::Done,
            ]
        );
        assert!(ctx.state.keep_existing);
        assert_eq!(ctx.platform.calls.last().map(String::as_str), Some("install_bootloader"));
        assert!(!ctx.platform.calls.iter().any(|c| c.starts_with("write_table") || c == "format"));

        let plan = ctx.state.plan.unwrap();
        assert_eq!(plan.slot(SlotKind::Esp).node.as_deref(), Some("/dev/sdb1"));
        assert_eq!(plan.slot(SlotKind::System).size_mib, 2000);
    }

    #[test]
    fn test_reformat_instead_of_keep() {
        let mut platform = FakePlatform::with_stick();
        platform.partitions = reusable_layout();
        let mut wizard = controller(
            vec![
                Scripted::Menu(Advance, Some("/dev/sdb")),
                Scripted::Menu(Advance, Some("format")),
                Scripted::Check(Quit, vec![]),
            ],
            platform,
        );

        assert_eq!(wizard.run().unwrap(), WizardExit::UserQuit);

        let ctx = wizard.into_context();
        assert!(!ctx.state.keep_existing);
        let plan = ctx.state.plan.unwrap();
        assert!(plan.slots.iter().all(|s| !s.enabled && s.node.is_none()));
    }
}
