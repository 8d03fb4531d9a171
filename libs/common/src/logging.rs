//! Logging initialization.
//!
//! Provides a single `init` entry point used by CLI binaries, following the
//! same bracketed-level console format as the rest of the VoltageEMS stack,
//! trimmed of the daily-rolling/gzip file sink that service-daemon logging
//! needs but a one-shot CLI tool does not.

use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono_now();
        write!(writer, "{now} ")?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Formats the current wall-clock time without depending on `chrono`'s
/// workspace feature set beyond what this crate declares.
fn chrono_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:06}s", dur.as_secs(), dur.subsec_micros())
}

/// Initialize tracing for a CLI binary.
///
/// `verbose` raises the default filter to `debug`; otherwise the filter
/// comes from the `env_var` environment variable, falling back to `info`.
/// When `log_file` is given, logs are additionally mirrored there via a
/// non-blocking writer; the returned guard must be kept alive for the
/// duration of the process (dropping it flushes and stops the writer).
pub fn init(
    verbose: bool,
    env_var: &str,
    log_file: Option<&Path>,
) -> std::io::Result<Option<WorkerGuard>> {
    let default_filter = if verbose { "debug" } else { "info" };
    let console_filter = EnvFilter::try_from_env(env_var)
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let console_layer = tracing_subscriber::fmt::layer()
        .event_format(BracketedLevelFormat)
        .with_filter(console_filter);

    match log_file {
        None => {
            tracing_subscriber::registry().with(console_layer).init();
            Ok(None)
        },
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            if let Some(dir) = dir {
                std::fs::create_dir_all(dir)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let file_filter = EnvFilter::try_from_env(env_var)
                .unwrap_or_else(|_| EnvFilter::new(default_filter));
            let file_layer = tracing_subscriber::fmt::layer()
                .event_format(BracketedLevelFormat)
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter);

            tracing_subscriber::registry()
                .with(console_layer)
                .with(file_layer)
                .init();
            Ok(Some(guard))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_path_is_created_under_missing_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("redis-mover.log");
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path);
        // Mirrors the create_dir_all + OpenOptions sequence in `init` without
        // touching the global tracing subscriber, which can only be set once
        // per process.
        assert!(file.is_err());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        assert!(std::fs::OpenOptions::new().create(true).append(true).open(&path).is_ok());
    }

    #[test]
    fn format_level_brackets_every_variant() {
        assert_eq!(format_level(&Level::TRACE), "[TRACE]");
        assert_eq!(format_level(&Level::DEBUG), "[DEBUG]");
        assert_eq!(format_level(&Level::INFO), "[INFO]");
        assert_eq!(format_level(&Level::WARN), "[WARN]");
        assert_eq!(format_level(&Level::ERROR), "[ERROR]");
    }
}
