//! The ignore predicate: a compiled allow-list of candidate paths that must
//! never be passed to `View::prune`.
//!
//! Compiled once, at startup, from an embedded default pattern file plus an
//! optional user-supplied file of the same syntax. Threaded by reference
//! into the prune loop and the contents filter rather than kept as global
//! state.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// Bundled default patterns: conventional bytecode/metadata noise that is
/// safe to drop unconditionally. Anything with genuine runtime relevance
/// (a package's own test helpers, say) is deliberately *not* defaulted here
/// and is instead left to the tracer to prove unused.
pub const DEFAULT_IGNORES: &str = include_str!("default_ignores.txt");

#[derive(Debug)]
pub struct IgnoreSet {
    compiled: Gitignore,
    ignore_libs: bool,
}

impl IgnoreSet {
    /// Build from the embedded defaults plus an optional extra pattern file.
    pub fn load(extra_file: Option<&Utf8Path>, ignore_libs: bool) -> Result<Self> {
        let mut builder = GitignoreBuilder::new("");
        for line in DEFAULT_IGNORES.lines() {
            builder
                .add_line(None, line)
                .context("compiling embedded default ignore patterns")?;
        }
        if let Some(path) = extra_file {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading ignore file {path}"))?;
            for line in contents.lines() {
                builder
                    .add_line(Some(path.to_path_buf().into_std_path_buf()), line)
                    .with_context(|| format!("compiling ignore patterns from {path}"))?;
            }
        }
        let compiled = builder.build().context("compiling ignore pattern set")?;
        Ok(Self {
            compiled,
            ignore_libs,
        })
    }

    /// True when `path` (or one of its ancestor directories) matches a
    /// positive pattern not overridden by a later negation, or when
    /// `ignore-libs` is set and `path` is a versioned `.so`.
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        if path.is_empty() {
            return false;
        }
        if self.ignore_libs && is_shared_object(path) {
            return true;
        }
        self.compiled
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }
}

/// True when `path` ends with `.so`, optionally followed by a dotted
/// version suffix (`foo.so`, `foo.so.1`, `foo.so.1.2.3`), and contains no
/// further path separator after the `.so`.
fn is_shared_object(path: &str) -> bool {
    let Some(so_idx) = path.rfind(".so") else {
        return false;
    };
    let rest = &path[so_idx + 3..];
    rest.is_empty() || rest.chars().all(|c| c == '.' || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(extra: &str, ignore_libs: bool) -> IgnoreSet {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("extra.txt")).unwrap();
        std::fs::write(&path, extra).unwrap();
        IgnoreSet::load(Some(&path), ignore_libs).unwrap()
    }

    #[test]
    fn default_ignores_pycache() {
        let s = set("", false);
        assert!(s.is_ignored("a/__pycache__", true));
        assert!(s.is_ignored("a/__pycache__/mod.cpython-311.pyc", false));
    }

    #[test]
    fn negation_overrides() {
        let s = set("*.log\n!keep.log\n", false);
        assert!(s.is_ignored("build.log", false));
        assert!(!s.is_ignored("keep.log", false));
    }

    #[test]
    fn parent_match_propagates_to_children() {
        let s = set("vendor/\n", false);
        assert!(s.is_ignored("vendor", true));
        assert!(s.is_ignored("vendor/inner/file.py", false));
    }

    #[test]
    fn ignore_libs_matches_versioned_so() {
        let s = set("", true);
        assert!(s.is_ignored("pkg/_speedups.so", false));
        assert!(s.is_ignored("pkg/libfoo.so.1.2.3", false));
        assert!(!s.is_ignored("pkg/libfoo.so.1.2.3/weird", false));
        assert!(!s.is_ignored("pkg/mod.py", false));
    }

    #[test]
    fn empty_path_never_ignored() {
        let s = set("*\n", false);
        assert!(!s.is_ignored("", false));
    }
}
