use anyhow::{Context, Result};
use std::cell::RefCell;
use std::io::Write;
use std::process::{Command, Output, Stdio};

use crate::common::shell::command_line;
use crate::ui::prelude::*;

pub mod bootloader;
pub mod cleanup;
pub mod disk;
pub mod preflight;

pub struct CommandExecutor {
    pub dry_run: bool,
    /// Commands skipped in dry-run mode, kept until the terminal is free
    skipped: RefCell<Vec<String>>,
}

impl CommandExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            skipped: RefCell::new(Vec::new()),
        }
    }

    /// Drain the dry-run lines recorded so far
    pub fn take_dry_run_log(&self) -> Vec<String> {
        self.skipped.take()
    }

    pub fn run(&self, command: &mut Command) -> Result<()> {
        if self.dry_run {
            self.print_dry_run(command, None);
            return Ok(());
        }

        emit(Level::Debug, "exec.run", &command_line(command), None);
        let output = command
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to start {}", command_line(command)))?;
        log_output(command, &output);
        if !output.status.success() {
            anyhow::bail!(
                "Command failed ({}): {}",
                output.status,
                command_line(command)
            );
        }
        Ok(())
    }

    pub fn run_with_input(&self, command: &mut Command, input: &str) -> Result<()> {
        if self.dry_run {
            self.print_dry_run(command, Some(input));
            return Ok(());
        }

        emit(
            Level::Debug,
            "exec.run",
            &format!("{} <<EOF\n{}EOF", command_line(command), input),
            None,
        );
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start {}", command_line(command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .with_context(|| format!("Failed to feed {}", command_line(command)))?;
        }

        let output = child.wait_with_output()?;
        log_output(command, &output);
        if !output.status.success() {
            anyhow::bail!(
                "Command failed ({}): {}",
                output.status,
                command_line(command)
            );
        }
        Ok(())
    }

    fn print_dry_run(&self, command: &Command, input: Option<&str>) {
        let cmd_str = command_line(command);

        let text = match input {
            Some(input_str) if input_str.contains('\n') => format!(
                "[DRY RUN] --- BEGIN COMMAND ---\n> {}\n{}\n[DRY RUN] --- END COMMAND ---",
                cmd_str,
                input_str.trim()
            ),
            Some(input_str) => format!("[DRY RUN] echo '{}' | {}", input_str, cmd_str),
            None => format!("[DRY RUN] {}", cmd_str),
        };
        emit(Level::Info, "exec.dry_run", &text, None);
        self.skipped.borrow_mut().push(text);
    }
}

fn log_output(command: &Command, output: &Output) {
    let program = command.get_program().to_string_lossy();
    for (stream, bytes) in [("stdout", &output.stdout), ("stderr", &output.stderr)] {
        for line in String::from_utf8_lossy(bytes).lines() {
            if !line.trim().is_empty() {
                log::debug!(target: "exec.output", "{} {}: {}", program, stream, line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_does_not_execute() {
        let executor = CommandExecutor::new(true);
        let mut cmd = Command::new("/nonexistent/program");

        assert!(executor.run(&mut cmd).is_ok());
        assert!(executor.run_with_input(&mut cmd, "label: gpt\n").is_ok());
    }

    #[test]
    fn test_dry_run_lines_are_kept_in_order() {
        let executor = CommandExecutor::new(true);
        executor.run(Command::new("umount").arg("/dev/sdb1")).unwrap();
        executor
            .run_with_input(Command::new("sfdisk").arg("/dev/sdb"), "label: gpt\nfirst-lba: 2048\n")
            .unwrap();

        let lines = executor.take_dry_run_log();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "[DRY RUN] umount /dev/sdb1");
        assert!(lines[1].contains("> sfdisk /dev/sdb\nlabel: gpt\nfirst-lba: 2048\n"));
        assert!(executor.take_dry_run_log().is_empty());
    }

    #[test]
    fn test_real_runs_are_not_recorded() {
        let executor = CommandExecutor::new(false);
        executor.run(&mut Command::new("true")).unwrap();
        assert!(executor.take_dry_run_log().is_empty());
    }

    #[test]
    fn test_failure_is_reported() {
        let executor = CommandExecutor::new(false);
        let err = executor.run(&mut Command::new("false")).unwrap_err();
        assert!(err.to_string().contains("Command failed"));
    }

    #[test]
    fn test_input_is_piped() {
        let executor = CommandExecutor::new(false);
        let mut cmd = Command::new("grep");
        cmd.args(["-q", "first-lba"]);

        assert!(executor.run_with_input(&mut cmd, "label: gpt\nfirst-lba: 2048\n").is_ok());
        assert!(executor.run_with_input(&mut cmd, "label: gpt\n").is_err());
    }
}
