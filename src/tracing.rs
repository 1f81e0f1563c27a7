use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Output flavour for the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    /// Long-running server: targets, files and line numbers.
    Server,
    /// One-shot admin command: compact lines without source locations.
    Cli,
}

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// `default_filter` is used when `RUST_LOG` is not set, e.g. `info,sqlx=warn`.
pub fn init_tracing(default_filter: &str, style: LogStyle) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let verbose = style == LogStyle::Server;

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_line_number(verbose)
        .with_file(verbose)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}
