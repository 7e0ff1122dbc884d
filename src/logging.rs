//! Tracing setup, used by the binary entrypoint.

/// Initialize tracing with the default configuration.
///
/// Don't include timestamps; several log targets (journald, CI log
/// collectors) already add their own, and the oracle's own stdout/stderr
/// is captured separately to files rather than interleaved here.
pub fn initialize_tracing() {
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .event_format(format)
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN)
        .init();
}
