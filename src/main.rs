use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;

use pip_prune::cli::{self, Cli};
use pip_prune::ignore::IgnoreSet;
use pip_prune::oracle::Oracle;
use pip_prune::prune;
use pip_prune::provision;
use pip_prune::view::View;

fn main() {
    pip_prune::logging::initialize_tracing();
    if let Err(e) = run() {
        tracing::error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let raw_argv: Vec<String> = std::env::args().skip(1).collect();
    let (flag_argv, install_args, smoke_argv) = cli::split_triple_dash(&raw_argv)?;

    let cli = Cli::try_parse_from(std::iter::once("pip-prune".to_string()).chain(flag_argv))
        .context("parsing flags")?;

    anyhow::ensure!(
        !smoke_argv.is_empty(),
        "no smoke-test command given after the second `--`"
    );

    let tmp_root = Utf8PathBuf::from_path_buf(std::env::temp_dir())
        .map_err(|p| anyhow::anyhow!("temp dir {} is not valid UTF-8", p.display()))?;

    let reference_install = provision::provision(&install_args, &tmp_root)?;

    let mut view = View::create(&reference_install, &tmp_root)?;
    let ignores = IgnoreSet::load(cli.ignore.as_deref(), cli.ignore_libs)?;
    let oracle = Oracle::new(smoke_argv, &tmp_root)?;

    let result = prune::run(&mut view, &oracle, &ignores, cli.depth);

    let log = match result {
        Ok(log) => log,
        Err(e) => {
            if cli.nocleanup {
                let root = view.leak();
                tracing::warn!(%root, "retaining view for diagnosis");
            }
            return Err(e);
        }
    };

    let lib_root = view.lib_root();
    let lines: Vec<String> = log
        .accepted
        .iter()
        .map(|p| {
            if cli.absolute {
                lib_root.join(p).to_string()
            } else {
                p.clone()
            }
        })
        .collect();

    let mut contents = lines.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    std::fs::write(&cli.output, contents)
        .with_context(|| format!("writing prune list to {}", cli.output))?;

    let remaining_size = view.size("").unwrap_or_else(|_| "unknown".to_string());
    tracing::info!(
        count = log.accepted.len(),
        output = %cli.output,
        remaining_size,
        "wrote prune list"
    );

    if cli.nocleanup {
        let root = view.leak();
        tracing::info!(%root, "retaining view on request (--nocleanup)");
    }

    Ok(())
}
