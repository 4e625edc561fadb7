use std::io::IsTerminal;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// When set, log lines go to this file instead of stderr.
pub const LOG_ENV_VAR: &str = "NULL_TERM_LOG";

/// Keeps the non-blocking file writer flushing until dropped.
#[derive(Debug)]
pub struct TelemetryGuard {
    _guard: Option<WorkerGuard>,
}

impl TelemetryGuard {
    fn disabled() -> Self {
        Self { _guard: None }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
///
/// The panel process renders shell output on stdout, so logs never share it:
/// they go to stderr, or to `NULL_TERM_LOG` when that is set.
pub fn init_tracing(default_level: &str) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (writer, guard, ansi) = match log_file_path_from_env() {
        Some(path) => match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                (BoxMakeWriter::new(non_blocking), Some(guard), false)
            }
            Err(err) => {
                eprintln!(
                    "Warning: failed to open log file {}: {}",
                    path.display(),
                    err
                );
                stderr_writer()
            }
        },
        None => stderr_writer(),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_names(true)
        .with_ansi(ansi)
        .with_writer(writer);

    if subscriber.try_init().is_err() {
        return TelemetryGuard::disabled();
    }

    TelemetryGuard { _guard: guard }
}

fn stderr_writer() -> (BoxMakeWriter, Option<WorkerGuard>, bool) {
    (
        BoxMakeWriter::new(std::io::stderr),
        None,
        std::io::stderr().is_terminal(),
    )
}

fn log_file_path_from_env() -> Option<PathBuf> {
    std::env::var(LOG_ENV_VAR)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
