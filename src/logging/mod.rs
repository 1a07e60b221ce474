use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use time::macros::format_description;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Multi-line, human-readable, coloured.
    Pretty,
    /// One JSON object per event.
    Json,
    /// Single-line.
    Compact,
}

pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Log file prefix; its parent directory holds the rotated files.
    pub file_path: Option<PathBuf>,
    pub max_log_files: Option<usize>,
}

const DEFAULT_MAX_LOG_FILES: usize = 7;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn build_filter(level: LogLevel) -> Result<EnvFilter, BoxError> {
    let level = tracing::Level::from(level);
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("mermaid_server={}", level).parse()?)
        .add_directive("trust_dns_proto=warn".parse()?)
        .add_directive("trust_dns_resolver=warn".parse()?)
        .add_directive("tokio=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower_http=info".parse()?);
    Ok(filter)
}

fn file_writer(
    file_path: &Path,
    max_files: usize,
) -> Result<(NonBlocking, WorkerGuard), BoxError> {
    let directory = match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("./logs"),
    };
    let prefix = file_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or("log file path has no file name")?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(max_files)
        .build(directory)?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Installs the global subscriber.
///
/// When logging to a file, the returned guard must be kept alive for as long as
/// events should be flushed to it.
pub fn configure_global_tracing(config: LogConfig) -> Result<Option<WorkerGuard>, BoxError> {
    let timer = LocalTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ));

    let registry = tracing_subscriber::registry().with(build_filter(config.level)?);
    let max_files = config.max_log_files.unwrap_or(DEFAULT_MAX_LOG_FILES);
    let file = config
        .file_path
        .as_deref()
        .map(|path| file_writer(path, max_files))
        .transpose()?;

    let guard = match (config.format, file) {
        (LogFormat::Pretty, Some((writer, guard))) => {
            let console_layer = fmt::layer()
                .pretty()
                .with_thread_ids(true)
                .with_line_number(false)
                .with_file(true)
                .with_timer(timer.clone())
                .with_writer(io::stdout);
            let file_layer = fmt::layer()
                .with_thread_ids(true)
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(writer);
            registry.with(console_layer).with(file_layer).try_init()?;
            Some(guard)
        }
        (LogFormat::Pretty, None) => {
            let console_layer = fmt::layer()
                .pretty()
                .with_thread_ids(true)
                .with_line_number(false)
                .with_file(true)
                .with_timer(timer)
                .with_writer(io::stdout);
            registry.with(console_layer).try_init()?;
            None
        }
        (LogFormat::Json, Some((writer, guard))) => {
            let console_layer = fmt::layer()
                .json()
                .with_timer(timer.clone())
                .with_writer(io::stdout);
            let file_layer = fmt::layer().json().with_timer(timer).with_writer(writer);
            registry.with(console_layer).with(file_layer).try_init()?;
            Some(guard)
        }
        (LogFormat::Json, None) => {
            let console_layer = fmt::layer().json().with_timer(timer).with_writer(io::stdout);
            registry.with(console_layer).try_init()?;
            None
        }
        (LogFormat::Compact, Some((writer, guard))) => {
            let console_layer = fmt::layer()
                .compact()
                .with_timer(timer.clone())
                .with_writer(io::stdout);
            let file_layer = fmt::layer()
                .compact()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(writer);
            registry.with(console_layer).with(file_layer).try_init()?;
            Some(guard)
        }
        (LogFormat::Compact, None) => {
            let console_layer = fmt::layer()
                .compact()
                .with_timer(timer)
                .with_writer(io::stdout);
            registry.with(console_layer).try_init()?;
            None
        }
    };

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels_map_to_tracing_levels() {
        assert_eq!(tracing::Level::from(LogLevel::Trace), tracing::Level::TRACE);
        assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);
        assert_eq!(tracing::Level::from(LogLevel::Error), tracing::Level::ERROR);
    }

    #[test]
    fn filter_builds_for_every_level() {
        for level in LogLevel::value_variants() {
            assert!(build_filter(*level).is_ok());
        }
    }

    #[test]
    fn file_writer_uses_parent_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let (_writer, _guard) = file_writer(&dir.path().join("mermaid-server"), 3).unwrap();
    }
}
