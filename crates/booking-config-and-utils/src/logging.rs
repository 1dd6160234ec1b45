//! Logging initialization for the booking client.
//!
//! Structured JSONL goes to `~/.booking/logs/client.jsonl`, with a compact
//! human-readable copy on stderr. `RUST_LOG` overrides the configured level.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Append-only file writer shared between subscriber layers.
#[derive(Clone)]
struct LogFileWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl LogFileWriter {
    fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        // One event per write; flush so `tail -f` sees whole lines
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the logging system.
///
/// * `level` - Default log level (trace, debug, info, warn, error)
/// * `log_file` - JSONL destination; `None` logs to stderr only
///
/// If the log file cannot be opened, logging continues on stderr and the
/// failure is reported once initialization completes. Calling this twice is
/// harmless; the second subscriber is ignored.
pub fn init_logging(level: &str, log_file: Option<&Path>) {
    let (file_writer, open_error) = match log_file.map(LogFileWriter::open) {
        Some(Ok(writer)) => (Some(writer), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    let json_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(writer)
            .with_filter(env_filter(level))
    });

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_writer(io::stderr)
        .with_filter(env_filter(level));

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if !installed {
        return;
    }

    match (log_file, open_error) {
        (Some(path), Some(e)) => {
            tracing::warn!(log_path = %path.display(), error = %e, "Could not open log file, logging to stderr only");
        }
        (Some(path), None) => {
            tracing::debug!(log_path = %path.display(), "Logging initialized");
        }
        _ => {}
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
