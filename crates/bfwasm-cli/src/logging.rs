use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

/// Default filter for a `-d` count; `RUST_LOG` takes precedence
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialize logging.
///
/// Console output always goes to stderr: stdout carries the module's own bytes.
/// With `log_file`, a second plain-text layer is appended to that file.
///
/// Returns a guard that must be kept alive for the duration of the program.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    match log_file {
        Some(log_path) => {
            let file = open_log_file(log_path)?;
            let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(io::stderr).with_ansi(true))
                .with(
                    fmt::layer()
                        .with_writer(non_blocking_file)
                        .with_ansi(false)
                        .with_target(true),
                )
                .init();

            tracing::info!("Logging to file: {}", log_path.display());

            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(io::stderr)
                .init();

            Ok(None)
        }
    }
}

/// Open `log_path` for appending; a file already past MAX_LOG_SIZE starts over empty
fn open_log_file(log_path: &Path) -> io::Result<File> {
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let oversized = fs::metadata(log_path)
        .map(|metadata| metadata.len() > MAX_LOG_SIZE)
        .unwrap_or(false);

    OpenOptions::new()
        .create(true)
        .write(true)
        .append(!oversized)
        .truncate(oversized)
        .open(log_path)
}
