//! Kernel file-access tracing, abstracted behind a single operation so the
//! mechanism (`strace` today) can be swapped for an audit-subsystem or
//! preload-based implementation without touching the oracle.

use std::process::{Command, ExitStatus, Stdio};

use anyhow::{Context, Result};
use camino::Utf8Path;

use crate::error::PruneError;

/// A single raw line of tracer output, not yet resolved against the view.
pub type TraceLine = String;

pub trait Tracer: std::fmt::Debug {
    /// Run `program args...` under tracing with the given stdio, writing
    /// the raw trace to `trace_log_path`, and return the child's exit
    /// status plus the raw trace lines. `env` is inherited by the caller
    /// (the tracer never edits it).
    fn trace(
        &self,
        program: &str,
        args: &[String],
        stdout: Stdio,
        stderr: Stdio,
        trace_log_path: &Utf8Path,
    ) -> Result<(ExitStatus, Vec<TraceLine>)>;
}

/// `strace -f -e trace=open,openat -y`: follows forked children, restricts
/// to the open family, and annotates file descriptors with the resolved
/// path (`-y`), which is what lets the parser trust a quoted path directly
/// rather than re-deriving it from a bare descriptor number.
#[derive(Debug, Default)]
pub struct StraceTracer;

impl Tracer for StraceTracer {
    fn trace(
        &self,
        program: &str,
        args: &[String],
        stdout: Stdio,
        stderr: Stdio,
        trace_log_path: &Utf8Path,
    ) -> Result<(ExitStatus, Vec<TraceLine>)> {
        let mut strace = Command::new("strace");
        strace
            .arg("-f")
            .arg("-e")
            .arg("trace=open,openat")
            .arg("-y")
            .arg("-o")
            .arg(trace_log_path.as_str())
            .arg("--")
            .arg(program)
            .args(args)
            .stdout(stdout)
            .stderr(stderr);

        let status = strace
            .status()
            .with_context(|| format!("spawning strace for {program}"))?;

        let contents = std::fs::read_to_string(trace_log_path)
            .map_err(|e| PruneError::TraceUnreadable(trace_log_path.to_owned(), e))?;
        let lines = contents.lines().map(str::to_string).collect();
        Ok((status, lines))
    }
}

/// Parse one trace line into a candidate path, per the "first quoted
/// substring" variant: scan for the first `"..."`-delimited run of bytes
/// and treat it as the path, tolerating lines with no (or unterminated)
/// quotes by skipping them rather than failing the whole parse.
pub fn parse_trace_line(line: &str) -> Option<&str> {
    let start = line.find('"')?;
    let rest = &line[start + 1..];
    let end = rest.find('"')?;
    let candidate = &rest[..end];
    if candidate.is_empty() {
        None
    } else {
        Some(candidate)
    }
}

/// Resolve a raw traced path against the view's package root: it must
/// currently exist, canonicalize to something under `lib_root`, and yield
/// a non-empty relative path.
pub fn resolve_traced_path(raw: &str, lib_root: &Utf8Path) -> Option<String> {
    let path = std::path::Path::new(raw);
    let canonical = path.canonicalize().ok()?;
    let canonical = camino::Utf8PathBuf::from_path_buf(canonical).ok()?;
    let rel = canonical.strip_prefix(lib_root).ok()?;
    if rel.as_str().is_empty() {
        None
    } else {
        Some(rel.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_quoted_substring() {
        let line = r#"openat(AT_FDCWD, "/venv/lib/python3.11/site-packages/a/b.py", O_RDONLY) = 3</venv/.../b.py>"#;
        assert_eq!(
            parse_trace_line(line),
            Some("/venv/lib/python3.11/site-packages/a/b.py")
        );
    }

    #[test]
    fn tolerates_missing_quotes() {
        assert_eq!(parse_trace_line("wait4(1234, ...) = 0"), None);
    }

    #[test]
    fn tolerates_unterminated_quote() {
        assert_eq!(parse_trace_line(r#"garbled "start of a path"#), None);
    }

    #[test]
    fn resolve_rejects_paths_outside_lib_root() {
        let dir = tempfile::tempdir().unwrap();
        let lib_root = camino::Utf8Path::from_path(dir.path()).unwrap().join("lib_root");
        std::fs::create_dir_all(&lib_root).unwrap();
        let outside = dir.path().join("elsewhere.txt");
        std::fs::write(&outside, b"x").unwrap();
        let raw = outside.to_str().unwrap();
        assert_eq!(resolve_traced_path(raw, &lib_root), None);
    }

    #[test]
    fn resolve_accepts_existing_path_under_lib_root() {
        let dir = tempfile::tempdir().unwrap();
        let lib_root = camino::Utf8Path::from_path(dir.path()).unwrap().join("lib_root");
        std::fs::create_dir_all(lib_root.join("pkg")).unwrap();
        std::fs::write(lib_root.join("pkg").join("mod.py"), b"x").unwrap();
        let raw = lib_root.join("pkg").join("mod.py");
        assert_eq!(
            resolve_traced_path(raw.as_str(), &lib_root),
            Some("pkg/mod.py".to_string())
        );
    }

    #[test]
    fn resolve_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let lib_root = camino::Utf8Path::from_path(dir.path()).unwrap().join("lib_root");
        std::fs::create_dir_all(&lib_root).unwrap();
        let raw = lib_root.join("gone.py");
        assert_eq!(resolve_traced_path(raw.as_str(), &lib_root), None);
    }
}
