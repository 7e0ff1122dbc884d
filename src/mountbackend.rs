//! Overlay mount backends.
//!
//! The view programs against this trait rather than against a concrete
//! mount mechanism, so the kernel overlay filesystem and a user-space
//! fallback are interchangeable. [`View`](crate::view::View) tries the
//! kernel backend first and falls back to [`FuseOverlay`] when the kernel
//! reports the filesystem type unsupported or permission denied.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::process::Command;

pub trait MountBackend: std::fmt::Debug {
    /// Compose `lower` below `upper`, using `workdir` as overlay scratch
    /// space, producing the merged view at `merged`.
    fn mount(&self, lower: &Utf8Path, upper: &Utf8Path, workdir: &Utf8Path, merged: &Utf8Path) -> Result<()>;

    /// Tear down a previous `mount` at `merged`.
    fn unmount(&self, merged: &Utf8Path) -> Result<()>;
}

fn overlay_options(lower: &Utf8Path, upper: &Utf8Path, workdir: &Utf8Path) -> String {
    format!("lowerdir={lower},upperdir={upper},workdir={workdir}")
}

/// The in-kernel `overlay` filesystem, mounted via a direct `mount(2)`
/// syscall.
#[derive(Debug, Default)]
pub struct KernelOverlay;

impl MountBackend for KernelOverlay {
    fn mount(&self, lower: &Utf8Path, upper: &Utf8Path, workdir: &Utf8Path, merged: &Utf8Path) -> Result<()> {
        let data = overlay_options(lower, upper, workdir);
        rustix::mount::mount(
            "overlay",
            merged.as_std_path(),
            "overlay",
            rustix::mount::MountFlags::empty(),
            data.as_str(),
        )
        .with_context(|| format!("mount(2) overlay at {merged}"))?;
        Ok(())
    }

    fn unmount(&self, merged: &Utf8Path) -> Result<()> {
        rustix::mount::unmount(merged.as_std_path(), rustix::mount::UnmountFlags::empty())
            .with_context(|| format!("umount(2) of {merged}"))?;
        Ok(())
    }
}

/// A user-space overlay implementation (`fuse-overlayfs`), used when the
/// kernel driver is unavailable or the process lacks privilege to call
/// `mount(2)` directly. The command line and mount options are identical
/// to the kernel backend's.
#[derive(Debug, Default)]
pub struct FuseOverlay;

impl MountBackend for FuseOverlay {
    fn mount(&self, lower: &Utf8Path, upper: &Utf8Path, workdir: &Utf8Path, merged: &Utf8Path) -> Result<()> {
        let data = overlay_options(lower, upper, workdir);
        let status = Command::new("fuse-overlayfs")
            .arg("-o")
            .arg(data)
            .arg(merged.as_str())
            .status()
            .context("spawning fuse-overlayfs")?;
        anyhow::ensure!(status.success(), "fuse-overlayfs exited with {status}");
        Ok(())
    }

    fn unmount(&self, merged: &Utf8Path) -> Result<()> {
        let status = Command::new("fusermount")
            .arg("-u")
            .arg(merged.as_str())
            .status()
            .context("spawning fusermount -u")?;
        anyhow::ensure!(status.success(), "fusermount -u exited with {status}");
        Ok(())
    }
}

/// Select a working backend by attempting the kernel overlay first and
/// falling back to the FUSE daemon; returns the one that mounted
/// successfully so the caller can reuse it for the matching `unmount`.
pub fn mount_with_fallback(
    lower: &Utf8Path,
    upper: &Utf8Path,
    workdir: &Utf8Path,
    merged: &Utf8Path,
) -> Result<Box<dyn MountBackend + Send + Sync>> {
    match KernelOverlay.mount(lower, upper, workdir, merged) {
        Ok(()) => Ok(Box::new(KernelOverlay)),
        Err(kernel_err) => {
            tracing::debug!("kernel overlay mount failed ({kernel_err:#}), trying fuse-overlayfs");
            FuseOverlay
                .mount(lower, upper, workdir, merged)
                .with_context(|| format!("both overlay backends failed; kernel error was: {kernel_err:#}"))?;
            Ok(Box::new(FuseOverlay))
        }
    }
}
