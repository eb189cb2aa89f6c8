//! Logging.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter, Layer as _};

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Initializes the logging subsystem for `tracing`.
///
/// This function reads the `STRATA_LOG_LEVEL` environment variable to determine the log level to use. If the
/// environment variable is not set, `default_level` is used. Additionally, it reads the `STRATA_LOG_FORMAT_JSON`
/// environment variable to determine which output format to use. If it is set to `true` or `1`, the logs will be
/// formatted as JSON. Otherwise, the logs will default to a rich, colored, human-readable format.
///
/// # Errors
///
/// If the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging(default_level: LevelFilter) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let is_json = std::env::var("STRATA_LOG_FORMAT_JSON")
        .map(|s| s.trim().to_lowercase())
        .map(|s| s == "true" || s == "1")
        .unwrap_or(false);

    let level_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("STRATA_LOG_LEVEL")
        .from_env_lossy();

    let fmt_layer = if is_json {
        fmt::layer().json().flatten_event(true).with_target(true).boxed()
    } else {
        fmt::layer().with_ansi(true).with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(level_filter))
        .try_init()?;

    Ok(())
}
