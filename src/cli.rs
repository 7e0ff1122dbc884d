//! Command-line surface.
//!
//! Invocation shape is `pip-prune <flags> -- <package-install-args> --
//! <smoke-test-argv>`. `clap`'s trailing-varargs support only understands a
//! single `--`, so the second split happens on the raw argv before `Cli`
//! ever sees it.

use camino::Utf8PathBuf;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "pip-prune",
    version,
    about = "Prune unused files from a Python package install, proven safe by a smoke test"
)]
pub struct Cli {
    /// Maximum breadth-first descent depth when a one-shot prune attempt
    /// fails (0 limits the fallback to top-level entries only).
    #[arg(long, default_value_t = 1)]
    pub depth: u32,

    /// Retain the view and reference install on exit, for diagnosis.
    #[arg(long, default_value_t = false)]
    pub nocleanup: bool,

    /// Emit absolute paths rather than paths relative to the package root.
    #[arg(long, default_value_t = false)]
    pub absolute: bool,

    /// File to write the accepted prune list to, one path per line.
    #[arg(long, default_value = "prune.txt")]
    pub output: Utf8PathBuf,

    /// Additional gitignore-syntax ignore-pattern file.
    #[arg(long)]
    pub ignore: Option<Utf8PathBuf>,

    /// Also ignore shared-object files (`.so`, optionally versioned) by
    /// extension.
    #[arg(long, default_value_t = false)]
    pub ignore_libs: bool,
}

/// Split `argv` (not including argv[0]) on the first two `--` separators
/// into (flags, install_args, smoke_test_argv).
pub fn split_triple_dash(argv: &[String]) -> anyhow::Result<(Vec<String>, Vec<String>, Vec<String>)> {
    let first = argv
        .iter()
        .position(|a| a == "--")
        .ok_or_else(|| anyhow::anyhow!("usage: pip-prune <flags> -- <install-args> -- <smoke-test-argv>"))?;
    let rest = &argv[first + 1..];
    let second = rest
        .iter()
        .position(|a| a == "--")
        .ok_or_else(|| anyhow::anyhow!("usage: pip-prune <flags> -- <install-args> -- <smoke-test-argv>"))?;

    let flags = argv[..first].to_vec();
    let install_args = rest[..second].to_vec();
    let smoke_argv = rest[second + 1..].to_vec();
    Ok((flags, install_args, smoke_argv))
}
