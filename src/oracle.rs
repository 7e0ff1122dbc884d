//! The smoke-test oracle: runs the operator-supplied command against a
//! view and reports pass/fail, optionally under file-access tracing.

use std::collections::BTreeSet;
use std::fs::File;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;

use crate::error::PruneError;
use crate::trace::{self, Tracer};
use crate::view::View;

/// pass iff the smoke test exited zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Tracks invocation count and log locations for one smoke-test command.
pub struct Oracle {
    argv: Vec<String>,
    log_dir: Utf8PathBuf,
    counter: AtomicUsize,
    tracer: Box<dyn Tracer + Send + Sync>,
    last_stdout: Mutex<Option<Utf8PathBuf>>,
    last_stderr: Mutex<Option<Utf8PathBuf>>,
}

impl std::fmt::Debug for Oracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oracle")
            .field("argv", &self.argv)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

impl Oracle {
    #[context("creating oracle for smoke test {argv:?}")]
    pub fn new(argv: Vec<String>, tmp_root: &Utf8Path) -> Result<Self> {
        which("strace")
            .ok_or_else(|| anyhow::anyhow!("strace not found on PATH"))
            .map_err(PruneError::TracerUnavailable)?;

        let log_dir = Utf8PathBuf::from_path_buf(
            tempfile::Builder::new()
                .prefix("pip-prune-command-")
                .tempdir_in(tmp_root)
                .context("creating oracle log directory")?
                .into_path(),
        )
        .map_err(|p| anyhow::anyhow!("log dir path {} is not valid UTF-8", p.display()))?;
        tracing::info!(%log_dir, argv = ?argv, "logging smoke-test output");
        Ok(Self {
            argv,
            log_dir,
            counter: AtomicUsize::new(0),
            tracer: Box::new(trace::StraceTracer),
            last_stdout: Mutex::new(None),
            last_stderr: Mutex::new(None),
        })
    }

    fn next_invocation(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Run the smoke test against `view`, without tracing.
    #[context("running smoke test against view")]
    pub fn run(&self, view: &View) -> Result<Verdict> {
        let n = self.next_invocation();
        let stdout_path = self.log_dir.join(format!("stdout-{n}.log"));
        let stderr_path = self.log_dir.join(format!("stderr-{n}.log"));

        let stdout = File::create(&stdout_path)
            .with_context(|| format!("creating {stdout_path}"))?;
        let stderr = File::create(&stderr_path)
            .with_context(|| format!("creating {stderr_path}"))?;

        *self.last_stdout.lock().unwrap() = Some(stdout_path.clone());
        *self.last_stderr.lock().unwrap() = Some(stderr_path.clone());

        let mut cmd = Command::new(view.interpreter_path());
        cmd.args(&self.argv).stdout(stdout).stderr(stderr);

        let status = cmd.status().map_err(PruneError::OracleSpawnFailed)?;

        tracing::debug!(invocation = n, success = status.success(), "smoke test completed");
        Ok(if status.success() {
            Verdict::Pass
        } else {
            Verdict::Fail
        })
    }

    /// Run the smoke test under file-access tracing, returning the verdict
    /// and the traced-file set *U* (candidate paths relative to the
    /// package root).
    #[context("running smoke test with file-access tracing")]
    pub fn trace_files(&self, view: &View) -> Result<(Verdict, BTreeSet<String>)> {
        let n = self.next_invocation();
        let stdout_path = self.log_dir.join(format!("stdout-{n}.log"));
        let stderr_path = self.log_dir.join(format!("stderr-{n}.log"));
        let trace_path = self.log_dir.join(format!("strace-{n}.log"));

        let stdout = File::create(&stdout_path).with_context(|| format!("creating {stdout_path}"))?;
        let stderr = File::create(&stderr_path).with_context(|| format!("creating {stderr_path}"))?;

        *self.last_stdout.lock().unwrap() = Some(stdout_path.clone());
        *self.last_stderr.lock().unwrap() = Some(stderr_path.clone());

        let interpreter = view.interpreter_path();
        let (status, lines) = self.tracer.trace(
            interpreter.as_str(),
            &self.argv,
            stdout.into(),
            stderr.into(),
            &trace_path,
        )?;

        let lib_root = view.lib_root();
        let mut traced = BTreeSet::new();
        for line in &lines {
            let Some(raw) = trace::parse_trace_line(line) else {
                continue;
            };
            if let Some(rel) = trace::resolve_traced_path(raw, &lib_root) {
                traced.insert(rel);
            }
        }

        tracing::debug!(
            invocation = n,
            success = status.success(),
            traced_count = traced.len(),
            "trace pass completed"
        );

        let verdict = if status.success() { Verdict::Pass } else { Verdict::Fail };
        Ok((verdict, traced))
    }

    /// Emit the most recent stdout/stderr logs via structured logging, for
    /// diagnosis on a fatal error.
    pub fn dump(&self) {
        for (label, path) in [
            ("stdout", self.last_stdout.lock().unwrap().clone()),
            ("stderr", self.last_stderr.lock().unwrap().clone()),
        ] {
            let Some(path) = path else { continue };
            match std::fs::read_to_string(&path) {
                Ok(contents) => tracing::error!(%path, "smoke test {label}:\n{contents}"),
                Err(e) => tracing::error!(%path, error = %e, "could not read {label} log"),
            }
        }
    }
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
