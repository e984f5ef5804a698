use std::fs;
use std::io;
use std::path::Path;

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File the server's own log lines go to, inside the log directory
pub const SERVER_LOG: &str = "server.log";

/// Guard for the non-blocking file writer so it is not dropped early.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
/// Ensures logging is only initialized once.
static LOG_INIT: OnceCell<()> = OnceCell::new();

/// Initialize tracing with console output and a plain-text `server.log`.
///
/// `RUST_LOG` overrides the default `info` filter. Subsequent calls are
/// no-ops, so every subcommand can call this without coordinating.
pub fn init_logging(log_dir: &Path) -> io::Result<()> {
    LOG_INIT
        .get_or_try_init(|| configure_logging(log_dir))
        .map(|_| ())
}

fn configure_logging(log_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, SERVER_LOG);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep guard alive for the process lifetime.
    let _ = FILE_GUARD.set(guard);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer().with_writer(io::stderr);
    let file_layer = fmt::layer().with_ansi(false).with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)
}
