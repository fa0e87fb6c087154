//! Tracing subscriber setup for the CLI.
//!
//! Filter precedence: `RUST_LOG`, then the configured level, then `--verbose`
//! (debug), then `warn`. Logs go to stderr so command output stays clean.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(configured: Option<&str>, verbose: bool) -> String {
    match configured {
        Some(level) if !level.is_empty() => level.to_string(),
        _ if verbose => "debug".to_string(),
        _ => "warn".to_string(),
    }
}

/// Install the global subscriber. Calling it again is a no-op.
pub fn init_logging(configured: Option<&str>, verbose: bool, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(configured, verbose)))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}
