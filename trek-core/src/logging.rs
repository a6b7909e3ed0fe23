//! src/logging.rs
//! ============================================================================
//! # Logger: daily-rolling file output for `tracing` events
//!
//! Every event becomes one line:
//! `[SEQ] HH:MM:SS.mmm LEVEL [file:line target] message key=value ...`
//! with a process-wide sequence number so interleaved background tasks can be
//! put back in order. The file is written through a non-blocking worker; the
//! returned guard must stay alive for as long as events should be flushed.

use std::{
    fmt,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::Local;
use tokio::fs as TokioFs;
use tracing::{Event, Level, Subscriber};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter,
    fmt::{FmtContext, FormatEvent, FormatFields, format::Writer},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::config::LogConfig;
use crate::error::{AppError, AppResult};

const LOG_FILE_PREFIX: &str = "trek";
const LOG_FILE_SUFFIX: &str = "log";
const MAX_LOG_FILES: usize = 7;

const LEVEL_INFO: &str = "INFO";
const LEVEL_DEBUG: &str = "DEBUG";
const LEVEL_WARN: &str = "WARN";
const LEVEL_ERROR: &str = "ERROR";
const LEVEL_TRACE: &str = "TRACE";

const TRACE_SOURCE_UNKNOWN_STR: &str = "UNKNOWN_SOURCE_LOCATION";

static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[inline]
const fn get_level_string(level: Level) -> &'static str {
    match level {
        Level::INFO => LEVEL_INFO,
        Level::DEBUG => LEVEL_DEBUG,
        Level::WARN => LEVEL_WARN,
        Level::ERROR => LEVEL_ERROR,
        Level::TRACE => LEVEL_TRACE,
    }
}

/// Line formatter for the log file.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let seq: u64 = LOG_SEQUENCE.fetch_add(1, Ordering::AcqRel);

        write!(
            writer,
            "[{:06}] {} {:5} [{}:{} {}] ",
            seq,
            Local::now().format("%H:%M:%S%.3f"),
            get_level_string(*meta.level()),
            meta.file().unwrap_or(TRACE_SOURCE_UNKNOWN_STR),
            meta.line().unwrap_or(0),
            meta.target(),
        )?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

pub struct Logger;

impl Logger {
    /// Install the global subscriber. `RUST_LOG` wins over the configured
    /// level.
    pub async fn init_tracing(cfg: &LogConfig) -> AppResult<WorkerGuard> {
        setup_log_directory(&cfg.dir).await?;

        let file_appender: RollingFileAppender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix(LOG_FILE_SUFFIX)
            .max_log_files(MAX_LOG_FILES)
            .build(&cfg.dir)
            .map_err(|e| AppError::Other(format!("Failed to create file appender: {e}")))?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let filter: EnvFilter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&cfg.level)
                .map_err(|e| AppError::invalid_input("logging.level", e.to_string()))?,
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .event_format(LineFormat)
            .with_writer(non_blocking)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| AppError::Other(format!("Failed to install global tracing subscriber: {e}")))?;

        Ok(guard)
    }
}

async fn setup_log_directory(log_dir: &Path) -> AppResult<()> {
    if !TokioFs::try_exists(log_dir).await.unwrap_or(false) {
        TokioFs::create_dir_all(log_dir)
            .await
            .map_err(|e| AppError::from_io_at(log_dir, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_format_layout() {
        let captured = Captured::default();
        let writer = captured.clone();

        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .event_format(LineFormat)
                .with_writer(move || writer.clone())
                .with_ansi(false),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(marker = "DIR_STALE", "directory changed");
        });

        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line = text.lines().next().unwrap();

        assert!(line.starts_with('['));
        assert!(line.contains(" WARN  ["));
        assert!(line.contains("logging.rs:"));
        assert!(line.contains("directory changed"));
        assert!(line.contains("marker=\"DIR_STALE\""));
    }

    #[tokio::test]
    async fn test_setup_creates_nested_directory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = temp_dir.path().join("a/b/logs");

        setup_log_directory(&dir).await.unwrap();
        assert!(dir.is_dir());
    }
}
