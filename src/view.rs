//! The layered, mutable view over an immutable reference install.
//!
//! Four sibling directories live under a fresh temporary root: `lower` (the
//! reference install, read-only), `upper` (copy-on-write layer), `workdir`
//! (overlay scratch space) and `merged` (the mount point the rest of the
//! program treats as "the install"). Pruning and unpruning never touch
//! `lower`; every mutation lands in `upper`, which is what makes the view
//! transactionally reversible.

use std::fs;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;

use crate::error::PruneError;
use crate::mountbackend::{self, MountBackend};

const BYTECODE_CACHE_DIR: &str = "__pycache__";

/// A mounted, mutable view over a reference Python install.
pub struct View {
    lower: Utf8PathBuf,
    upper: Utf8PathBuf,
    workdir: Utf8PathBuf,
    merged: Utf8PathBuf,
    root: Utf8PathBuf,
    interpreter_name: String,
    backend: Box<dyn MountBackend + Send + Sync>,
    mounted: bool,
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("root", &self.root)
            .field("interpreter_name", &self.interpreter_name)
            .field("mounted", &self.mounted)
            .finish()
    }
}

impl View {
    /// Create the four sibling directories under a fresh temporary root and
    /// mount the overlay for the first time.
    #[context("creating layered view over reference install {reference_install}")]
    pub fn create(reference_install: &Utf8Path, tmp_root: &Utf8Path) -> Result<Self> {
        if !reference_install.is_dir() {
            return Err(PruneError::ReferenceInstallMissing(reference_install.to_owned()).into());
        }

        let root = Utf8PathBuf::from_path_buf(
            tempfile::Builder::new()
                .prefix("pip-prune-venv-")
                .tempdir_in(tmp_root)
                .context("creating view root directory")?
                .into_path(),
        )
        .map_err(|p| anyhow::anyhow!("temp dir path {} is not valid UTF-8", p.display()))?;
        tracing::info!(%root, "creating layered view");

        let upper = root.join("upper");
        let workdir = root.join("workdir");
        let merged = root.join("merged");
        for dir in [&upper, &workdir, &merged] {
            fs::create_dir(dir).with_context(|| format!("creating {dir}"))?;
        }

        let interpreter_name = discover_interpreter_name(reference_install)?;

        let backend = mountbackend::mount_with_fallback(reference_install, &upper, &workdir, &merged)
            .map_err(PruneError::MountFailed)?;

        Ok(Self {
            lower: reference_install.to_owned(),
            upper,
            workdir,
            merged,
            root,
            interpreter_name,
            backend,
            mounted: true,
        })
    }

    fn mount(&mut self) -> Result<()> {
        self.backend
            .mount(&self.lower, &self.upper, &self.workdir, &self.merged)
            .map_err(PruneError::MountFailed)?;
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) -> Result<()> {
        self.backend
            .unmount(&self.merged)
            .map_err(PruneError::UnmountFailed)?;
        self.mounted = false;
        Ok(())
    }

    /// The package root (`lib/<interpreter>/site-packages`) under `merged`.
    pub fn lib_root(&self) -> Utf8PathBuf {
        self.merged
            .join("lib")
            .join(&self.interpreter_name)
            .join("site-packages")
    }

    /// The interpreter binary under `merged`.
    pub fn interpreter_path(&self) -> Utf8PathBuf {
        let named = self.merged.join("bin").join(&self.interpreter_name);
        if named.exists() {
            named
        } else {
            self.merged.join("bin").join("python")
        }
    }

    fn merged_path(&self, rel: &str) -> Utf8PathBuf {
        if rel.is_empty() {
            self.lib_root()
        } else {
            self.lib_root().join(rel)
        }
    }

    fn upper_path(&self, rel: &str) -> Utf8PathBuf {
        self.upper
            .join("lib")
            .join(&self.interpreter_name)
            .join("site-packages")
            .join(rel)
    }

    fn lower_path(&self, rel: &str) -> Utf8PathBuf {
        self.lower
            .join("lib")
            .join(&self.interpreter_name)
            .join("site-packages")
            .join(rel)
    }

    /// Remove `rel` (file or directory) from the merged view. Idempotent:
    /// pruning an already-absent path, or a path whose ancestor is already
    /// pruned, is a no-op.
    #[context("pruning {rel}")]
    pub fn prune(&mut self, rel: &str) -> Result<()> {
        let target = self.merged_path(rel);
        let meta = match fs::symlink_metadata(&target) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("statting {target}")),
        };
        if meta.is_dir() {
            fs::remove_dir_all(&target).with_context(|| format!("removing directory {target}"))?;
        } else {
            fs::remove_file(&target).with_context(|| format!("removing file {target}"))?;
        }
        Ok(())
    }

    /// Undo the prune of a single path. Equivalent to `unprune_all(&[rel])`.
    pub fn unprune(&mut self, rel: &str) -> Result<()> {
        self.unprune_all(std::slice::from_ref(&rel.to_string()))
    }

    /// Undo the prune of every path in `rels` with a single unmount/remount
    /// cycle, by deleting the corresponding whiteout entries from `upper`.
    #[context("unpruning {} paths", rels.len())]
    pub fn unprune_all(&mut self, rels: &[String]) -> Result<()> {
        if rels.is_empty() {
            return Ok(());
        }
        self.unmount()?;
        for rel in rels {
            let whiteout = self.upper_path(rel);
            let result = match fs::symlink_metadata(&whiteout) {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(&whiteout),
                Ok(_) => fs::remove_file(&whiteout),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Nothing was ever pruned at this path; unprune of an
                    // already-present path is a no-op.
                    Ok(())
                }
                Err(e) => Err(e),
            };
            result.map_err(|source| PruneError::UnpruneFailed {
                path: whiteout.clone(),
                source: source.into(),
            })?;
        }
        self.mount()?;

        // Deleting the whiteout entries should have re-exposed the lower
        // layer wherever it has something to expose; if it didn't, the
        // overlay's whiteout state no longer matches what this view expects.
        for rel in rels {
            if self.lower_path(rel).exists() && !self.merged_path(rel).exists() {
                return Err(PruneError::WhiteoutInconsistent(self.merged_path(rel)).into());
            }
        }
        Ok(())
    }

    /// Every file (not directory) reachable under `rel`, as candidate paths
    /// relative to the package root.
    #[context("listing contents of {rel}")]
    pub fn contents(&self, rel: &str) -> Result<Vec<String>> {
        let base = self.merged_path(rel);
        let lib_root = self.lib_root();
        let mut out = Vec::new();
        if base.exists() {
            walk_files(&base, &mut |path| {
                let rel = path
                    .strip_prefix(&lib_root)
                    .unwrap_or(path)
                    .as_str()
                    .to_string();
                out.push(rel);
            })?;
        }
        Ok(out)
    }

    /// Immediate child entries (files and directories) of `rel`, as
    /// candidate paths relative to the package root. Used by the bounded
    /// BFS to expand a contested subtree.
    #[context("listing children of {rel}")]
    pub fn children(&self, rel: &str) -> Result<Vec<(String, bool)>> {
        let base = self.merged_path(rel);
        let lib_root = self.lib_root();
        let mut out = Vec::new();
        if !base.exists() {
            return Ok(out);
        }
        for entry in fs::read_dir(&base).with_context(|| format!("reading directory {base}"))? {
            let entry = entry?;
            let path = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|p| anyhow::anyhow!("non-UTF-8 path {}", p.display()))?;
            let is_dir = entry.file_type()?.is_dir();
            let rel = path
                .strip_prefix(&lib_root)
                .unwrap_or(&path)
                .as_str()
                .to_string();
            out.push((rel, is_dir));
        }
        out.sort();
        Ok(out)
    }

    /// Human-readable byte count of `rel`, computed by an in-process
    /// recursive walk rather than shelling out to `du`.
    pub fn size(&self, rel: &str) -> Result<String> {
        let base = self.merged_path(rel);
        let mut total: u64 = 0;
        if base.exists() {
            walk_files(&base, &mut |path| {
                if let Ok(meta) = fs::symlink_metadata(path) {
                    total += meta.len();
                }
            })?;
        }
        Ok(human_size(total))
    }

    /// Delete every directory named `__pycache__` anywhere under the
    /// package root, so stale bytecode never leaks state between
    /// verification runs.
    #[context("purging bytecode caches")]
    pub fn purge_caches(&self) -> Result<()> {
        let root = self.lib_root();
        if !root.exists() {
            return Ok(());
        }
        purge_caches_under(&root)
    }

    /// Retain the view's directories on disk rather than deleting them on
    /// drop, for post-mortem inspection of a failed run.
    pub fn leak(mut self) -> Utf8PathBuf {
        self.mounted = false; // suppress the unmount-on-drop attempt
        let root = self.root.clone();
        std::mem::forget(self);
        root
    }
}

impl Drop for View {
    fn drop(&mut self) {
        if self.mounted {
            if let Err(e) = self.backend.unmount(&self.merged) {
                tracing::warn!(error = %e, root = %self.root, "failed to unmount view during cleanup");
            }
        }
        if let Err(e) = fs::remove_dir_all(&self.root) {
            tracing::warn!(error = %e, root = %self.root, "failed to remove view root during cleanup");
        }
    }
}

fn discover_interpreter_name(reference_install: &Utf8Path) -> Result<String> {
    let lib_dir = reference_install.join("lib");
    let mut entries = fs::read_dir(&lib_dir)
        .with_context(|| format!("reading {lib_dir} to discover interpreter name"))?;
    let first = entries
        .next()
        .ok_or_else(|| anyhow::anyhow!("{lib_dir} contains no interpreter directory"))??;
    anyhow::ensure!(
        entries.next().is_none(),
        "{lib_dir} contains more than one directory; expected exactly one interpreter"
    );
    first
        .file_name()
        .into_string()
        .map_err(|_| anyhow::anyhow!("interpreter directory name is not valid UTF-8"))
}

fn walk_files(root: &Utf8Path, visit: &mut impl FnMut(&Utf8Path)) -> Result<()> {
    let meta = fs::symlink_metadata(root).with_context(|| format!("statting {root}"))?;
    if meta.is_dir() {
        for entry in fs::read_dir(root).with_context(|| format!("reading directory {root}"))? {
            let entry = entry?;
            let path = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|p| anyhow::anyhow!("non-UTF-8 path {}", p.display()))?;
            walk_files(&path, visit)?;
        }
    } else {
        visit(root);
    }
    Ok(())
}

fn purge_caches_under(root: &Utf8Path) -> Result<()> {
    for entry in fs::read_dir(root).with_context(|| format!("reading directory {root}"))? {
        let entry = entry?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|p| anyhow::anyhow!("non-UTF-8 path {}", p.display()))?;
        if entry.file_type()?.is_dir() {
            if path.file_name() == Some(BYTECODE_CACHE_DIR) {
                fs::remove_dir_all(&path).with_context(|| format!("removing {path}"))?;
            } else {
                purge_caches_under(&path)?;
            }
        }
    }
    Ok(())
}

fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_size_formats_units() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
