//! Reference-install provisioning: a thin wrapper around the package
//! manager that fills the fingerprint-keyed cache directory the rest of
//! the engine treats as an immutable `lower` layer.
//!
//! This module does not understand package-manager semantics beyond
//! invoking it and checking its exit status; dependency resolution is
//! entirely the external tool's problem.

use std::process::Command;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;

use crate::fingerprint::fingerprint;

const INTERPRETER_NAME: &str = "python3";

/// Resolve (creating if necessary) the cached reference-install directory
/// for the given `pip install` arguments.
#[context("provisioning reference install")]
pub fn provision(install_args: &[String], cache_root: &Utf8Path) -> Result<Utf8PathBuf> {
    let fp = fingerprint(install_args)?;
    let install_dir = cache_root.join(format!("pip-prune-ref-{fp}"));
    let site_packages = install_dir
        .join("lib")
        .join(INTERPRETER_NAME)
        .join("site-packages");
    let bin_dir = install_dir.join("bin");

    if install_dir.is_dir() && site_packages.is_dir() {
        tracing::info!(%install_dir, "reusing cached reference install");
        return Ok(install_dir);
    }

    tracing::info!(%install_dir, "provisioning fresh reference install");
    std::fs::create_dir_all(&site_packages)
        .with_context(|| format!("creating {site_packages}"))?;
    std::fs::create_dir_all(&bin_dir).with_context(|| format!("creating {bin_dir}"))?;

    bootstrap_interpreter(&bin_dir)?;
    install_packages(install_args, &site_packages)?;

    Ok(install_dir)
}

/// Populate `bin/<interpreter>` by symlinking the interpreter already on
/// `PATH`. The reference install only needs an interpreter binary that
/// resolves imports against its own `site-packages`, which Python does via
/// `sys.path` regardless of where the interpreter binary itself lives.
fn bootstrap_interpreter(bin_dir: &Utf8Path) -> Result<()> {
    let system_python = which(INTERPRETER_NAME)
        .or_else(|| which("python3"))
        .context("locating a python3 interpreter on PATH")?;
    let target = bin_dir.join(INTERPRETER_NAME);
    if !target.exists() {
        #[cfg(unix)]
        std::os::unix::fs::symlink(&system_python, &target)
            .with_context(|| format!("linking {target} to {system_python}"))?;
    }
    Ok(())
}

fn install_packages(install_args: &[String], site_packages: &Utf8Path) -> Result<()> {
    let status = Command::new("pip")
        .arg("install")
        .arg("--no-deps")
        .arg("--target")
        .arg(site_packages.as_str())
        .args(install_args)
        .status()
        .context("spawning pip install")?;
    anyhow::ensure!(status.success(), "pip install exited with {status}");
    Ok(())
}

fn which(name: &str) -> Option<Utf8PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Utf8PathBuf::from_path_buf(candidate).ok();
        }
    }
    None
}
