//! Logging sink construction
//!
//! The sink is a [`tracing::Dispatch`] rather than a global subscriber, so a
//! pipeline run can be handed its sink explicitly. Output goes to stdout and,
//! when configured, to a log file without ANSI colouring.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Build the logging sink described by `config`
///
/// `RUST_LOG` takes precedence over `config.level`. The log file is opened in
/// append mode and created (with its parent directory) if missing.
pub fn build_log_sink(config: &LoggingConfig) -> Result<Dispatch> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let file_layer = match config.path.as_deref() {
        Some(path) if !path.as_os_str().is_empty() => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        _ => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer);

    Ok(Dispatch::new(subscriber))
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| Error::write(parent, e))?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::write(path, e))
}
