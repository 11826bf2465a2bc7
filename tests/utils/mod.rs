use anyhow::Result;
use std::process::Command;

use super::common::TestEnvironment;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

fn bootstick(vars: &[(&str, &str)]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bootstick"));
    cmd.env_remove("BOOTSTICK_CONFIG");
    for (key, value) in vars {
        cmd.env(key, value);
    }
    cmd
}

fn capture(mut cmd: Command) -> Result<CommandOutput> {
    let output = cmd.output()?;
    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Run the binary with the environment's config file
pub fn run_bootstick_command(env: &TestEnvironment, args: &[&str]) -> Result<CommandOutput> {
    let mut cmd = bootstick(&[]);
    cmd.arg("--config").arg(env.config_path()).args(args);
    capture(cmd)
}

/// Run the binary without --config, with extra environment variables
pub fn run_with_env(args: &[&str], vars: &[(&str, &str)]) -> Result<CommandOutput> {
    let mut cmd = bootstick(vars);
    cmd.args(args);
    capture(cmd)
}
