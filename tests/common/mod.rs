use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory holding a config file and the log of one test run
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let env = Self { temp_dir };
        env.write_config("")?;
        Ok(env)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("config.toml")
    }

    pub fn log_path(&self) -> PathBuf {
        self.path().join("bootstick.log")
    }

    /// Write `extra` after a [logging] section that keeps the log inside
    /// the scratch directory
    pub fn write_config(&self, extra: &str) -> Result<()> {
        let content = format!(
            "[logging]\nfile = \"{}\"\n\n{}",
            self.log_path().display(),
            extra
        );
        fs::write(self.config_path(), content)?;
        Ok(())
    }
}
