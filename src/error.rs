//! Crate-wide error taxonomy.
//!
//! Most fallible functions return `anyhow::Result`; this enum exists so
//! callers that need to distinguish "expected oracle failure" from "the view
//! is in an unknown state" can match on a concrete kind instead of string
//! sniffing an `anyhow::Error`.

use camino::Utf8PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum PruneError {
    #[error("reference install missing at {0}")]
    ReferenceInstallMissing(Utf8PathBuf),

    #[error("failed to mount overlay view: {0}")]
    MountFailed(#[source] anyhow::Error),

    #[error("failed to unmount overlay view: {0}")]
    UnmountFailed(#[source] anyhow::Error),

    #[error("file-access tracer is not usable: {0}")]
    TracerUnavailable(#[source] anyhow::Error),

    #[error("failed to compute reference-install fingerprint: {0}")]
    FingerprintIo(#[source] std::io::Error),

    #[error("smoke test could not be spawned: {0}")]
    OracleSpawnFailed(#[source] std::io::Error),

    #[error("unprune of {path} failed: {source}")]
    UnpruneFailed {
        path: Utf8PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("whiteout state for {0} is inconsistent with the prune log")]
    WhiteoutInconsistent(Utf8PathBuf),

    #[error("could not read trace file {0}")]
    TraceUnreadable(Utf8PathBuf, #[source] std::io::Error),

    #[error("smoke test failed on the very first run, before any pruning")]
    InitialSmokeTestFailed,

    #[error("smoke test failed after pruning; consider adding ignore patterns")]
    PostPruneSmokeTestFailed,
}
