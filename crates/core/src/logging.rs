//! Logging initialization and configuration.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging system with tracing.
///
/// Sets up tracing-subscriber with environment-based filtering (`RUST_LOG`)
/// and console output. When `log_file` is given, everything is additionally
/// written to that file so errors survive the process (the window may be
/// gone by the time anyone looks).
///
/// # Example
/// ```no_run
/// abrogue_core::init_logging(None);
/// tracing::info!("engine starting");
/// ```
pub fn init_logging(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,abrogue=debug"));

    let file_layer = log_file.and_then(|path| match File::create(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        ),
        Err(e) => {
            eprintln!("couldn't create log file {}: {e}", path.display());
            None
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();
}
