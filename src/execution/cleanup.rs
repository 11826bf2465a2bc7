//! Process-wide tracking of mounts and temporary directories
//!
//! Everything registered here is released by [`release_all`], which runs when
//! the [`CleanupGuard`] held by `main` is dropped and is called directly
//! before any `process::exit`.

use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::TempDir;

use crate::ui::prelude::*;

enum Resource {
    Mount(PathBuf),
    TempDir(TempDir),
}

lazy_static! {
    static ref RESOURCES: Mutex<Vec<Resource>> = Mutex::new(Vec::new());
}

fn resources() -> MutexGuard<'static, Vec<Resource>> {
    RESOURCES.lock().unwrap_or_else(PoisonError::into_inner)
}

fn push(resource: Resource) {
    resources().push(resource);
}

/// Create a temporary directory that lives until cleanup
pub fn temp_dir(prefix: &str) -> anyhow::Result<PathBuf> {
    let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
    let path = dir.path().to_path_buf();
    push(Resource::TempDir(dir));
    Ok(path)
}

/// Record a mount point that has to be unmounted on exit
pub fn register_mount(path: &Path) {
    push(Resource::Mount(path.to_path_buf()));
}

/// Unmount `path` now and forget about it
pub fn release_mount(path: &Path) -> anyhow::Result<()> {
    unmount(path)?;
    let mut resources = resources();
    if let Some(pos) = resources
        .iter()
        .rposition(|r| matches!(r, Resource::Mount(p) if p == path))
    {
        resources.remove(pos);
    }
    Ok(())
}

#[cfg(test)]
pub fn pending() -> usize {
    resources().len()
}

fn unmount(path: &Path) -> anyhow::Result<()> {
    let status = Command::new("umount").arg(path).status()?;
    if !status.success() {
        anyhow::bail!("umount {} failed ({})", path.display(), status);
    }
    Ok(())
}

/// Release everything in reverse order of acquisition. Safe to call more
/// than once.
pub fn release_all() {
    let drained: Vec<Resource> = resources().drain(..).collect();

    for resource in drained.into_iter().rev() {
        match resource {
            Resource::Mount(path) => {
                if let Err(e) = unmount(&path) {
                    emit(Level::Warn, "cleanup.unmount", &e.to_string(), None);
                } else {
                    emit(
                        Level::Debug,
                        "cleanup.unmount",
                        &format!("Unmounted {}", path.display()),
                        None,
                    );
                }
            }
            Resource::TempDir(dir) => {
                let path = dir.path().to_path_buf();
                if let Err(e) = dir.close() {
                    emit(
                        Level::Warn,
                        "cleanup.tempdir",
                        &format!("Could not remove {}: {}", path.display(), e),
                        None,
                    );
                }
            }
        }
    }
}

/// Releases all registered resources when dropped
#[derive(Default)]
pub struct CleanupGuard;

impl CleanupGuard {
    pub fn new() -> Self {
        CleanupGuard
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_temp_dirs_removed() {
        release_all();
        let first = temp_dir("bootstick-test").unwrap();
        let second = temp_dir("bootstick-test").unwrap();
        assert!(first.is_dir() && second.is_dir());
        assert_eq!(pending(), 2);

        release_all();

        assert!(!first.exists());
        assert!(!second.exists());
        assert_eq!(pending(), 0);
    }

    #[test]
    #[serial]
    fn test_guard_releases_on_drop() {
        release_all();
        let dir = {
            let _guard = CleanupGuard::new();
            temp_dir("bootstick-guard").unwrap()
        };
        assert!(!dir.exists());
    }

    #[test]
    #[serial]
    fn test_release_all_twice() {
        release_all();
        temp_dir("bootstick-twice").unwrap();
        release_all();
        release_all();
        assert_eq!(pending(), 0);
    }
}
