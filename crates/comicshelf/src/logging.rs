//! Process-wide log setup for the binary.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber and routes `log` records into it.
///
/// The filter comes from `RUST_LOG`, falling back to `default_filter`.
/// Calling this twice is an error from the underlying registries.
pub fn init_logging(default_filter: &str, json: bool) -> anyhow::Result<()> {
    tracing_log::LogTracer::init()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
