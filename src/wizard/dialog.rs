//! `dialog(1)` backed step renderer

use anyhow::{Context, Result};
use std::process::{Command, Stdio};

use super::outcome::{Step, StepOutcome};
use super::renderer::{CheckItem, FormField, MenuItem, Reply, StepRenderer};
use crate::common::shell::command_line;
use crate::ui::prelude::*;

const FIELD_COLUMN: &str = "22";
const FIELD_WIDTH: &str = "16";
const FIELD_MAX: &str = "32";

pub struct DialogRenderer {
    backtitle: String,
}

impl DialogRenderer {
    pub fn new(backtitle: impl Into<String>) -> Self {
        Self {
            backtitle: backtitle.into(),
        }
    }

    pub fn base_command(&self, step: Step, back: bool) -> Command {
        let mut cmd = Command::new("dialog");
        cmd.args([
            "--backtitle",
            &self.backtitle,
            "--title",
            &format!(
                "Step {} of {}: {}",
                step.number(),
                Step::ALL.len(),
                step.title()
            ),
        ]);
        if back && step != Step::SelectDevice {
            cmd.args(["--extra-button", "--extra-label", "Back"]);
        }
        cmd
    }

    /// Run dialog on the terminal and collect its answer from stderr
    fn run(&self, mut cmd: Command) -> Result<(StepOutcome, String)> {
        log::debug!(target: "dialog.run", "{}", command_line(&cmd));

        let child = cmd
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to start dialog")?;
        let output = child.wait_with_output().context("Failed to wait for dialog")?;

        let outcome = StepOutcome::from_status(output.status);
        let answer = String::from_utf8_lossy(&output.stderr).into_owned();
        log::debug!(target: "dialog.run", "outcome {:?}, answer {:?}", outcome, answer);
        Ok((outcome, answer))
    }
}

pub fn menu_args(text: &str, items: &[MenuItem]) -> Vec<String> {
    let mut args = vec![
        "--cancel-label".to_string(),
        "Quit".to_string(),
        "--menu".to_string(),
        text.to_string(),
        "0".to_string(),
        "0".to_string(),
        "0".to_string(),
    ];
    for item in items {
        args.push(item.tag.clone());
        args.push(item.label.clone());
    }
    args
}

pub fn checklist_args(text: &str, items: &[CheckItem]) -> Vec<String> {
    let mut args = vec![
        "--cancel-label".to_string(),
        "Quit".to_string(),
        "--separate-output".to_string(),
        "--checklist".to_string(),
        text.to_string(),
        "0".to_string(),
        "0".to_string(),
        "0".to_string(),
    ];
    for item in items {
        args.push(item.tag.clone());
        args.push(item.label.clone());
        args.push(if item.on { "on" } else { "off" }.to_string());
    }
    args
}

pub fn form_args(text: &str, fields: &[FormField]) -> Vec<String> {
    let mut args = vec![
        "--cancel-label".to_string(),
        "Quit".to_string(),
        "--form".to_string(),
        text.to_string(),
        "0".to_string(),
        "0".to_string(),
        "0".to_string(),
    ];
    for (row, field) in fields.iter().enumerate() {
        let row = (row + 1).to_string();
        args.extend([
            field.label.clone(),
            row.clone(),
            "1".to_string(),
            field.value.clone(),
            row,
            FIELD_COLUMN.to_string(),
            FIELD_WIDTH.to_string(),
            FIELD_MAX.to_string(),
        ]);
    }
    args
}

/// dialog prints one line per form field or checked tag
pub fn answer_lines(answer: &str) -> Vec<String> {
    answer
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

impl StepRenderer for DialogRenderer {
    fn menu(&mut self, step: Step, text: &str, items: &[MenuItem]) -> Result<Reply<Option<String>>> {
        let mut cmd = self.base_command(step, true);
        cmd.args(menu_args(text, items));
        let (outcome, answer) = self.run(cmd)?;
        let tag = answer.trim();
        Ok(Reply::new(
            outcome,
            (!tag.is_empty()).then(|| tag.to_string()),
        ))
    }

    fn checklist(&mut self, step: Step, text: &str, items: &[CheckItem]) -> Result<Reply<Vec<String>>> {
        let mut cmd = self.base_command(step, true);
        cmd.args(checklist_args(text, items));
        let (outcome, answer) = self.run(cmd)?;
        Ok(Reply::new(outcome, answer_lines(&answer)))
    }

    fn form(&mut self, step: Step, text: &str, fields: &[FormField]) -> Result<Reply<Vec<String>>> {
        let mut cmd = self.base_command(step, true);
        cmd.args(form_args(text, fields));
        let (outcome, answer) = self.run(cmd)?;
        // Empty fields still produce a line, keep positions intact
        let values = answer.lines().map(|l| l.trim().to_string()).collect();
        Ok(Reply::new(outcome, values))
    }

    fn confirm(&mut self, step: Step, text: &str) -> Result<StepOutcome> {
        let mut cmd = self.base_command(step, true);
        cmd.args([
            "--yes-label",
            "Continue",
            "--no-label",
            "Quit",
            "--yesno",
            text,
            "0",
            "0",
        ]);
        Ok(self.run(cmd)?.0)
    }

    fn message(&mut self, step: Step, text: &str) -> Result<StepOutcome> {
        let mut cmd = self.base_command(step, false);
        cmd.args(["--msgbox", text, "0", "0"]);
        Ok(self.run(cmd)?.0)
    }

    fn progress(&mut self, step: Step, text: &str) -> Result<()> {
        emit(Level::Info, "dialog.progress", text, None);
        let mut cmd = self.base_command(step, false);
        cmd.args(["--infobox", text, "0", "0"]);
        let (outcome, _) = self.run(cmd)?;
        if outcome != StepOutcome::Advance {
            anyhow::bail!("dialog --infobox exited with {:?}", outcome);
        }
        Ok(())
    }
}
