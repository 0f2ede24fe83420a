//! Subscriber setup for the `sharesync` binary.

use std::path::Path;

use chrono::Local;
use tracing::{warn, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Directives for the per-run log file.
const FILE_DIRECTIVES: &str = "info,sharesync=debug";

/// Log to stderr (filtered by `RUST_LOG`, default `info`) and to
/// `log_dir/.sharesync_<timestamp>.log` at debug level.
///
/// When the log file cannot be created only the stderr layer is installed
/// and `None` is returned. Otherwise keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init(log_dir: &Path) -> Option<WorkerGuard> {
    // A subscriber may already be installed (tests, embedding); keep it.
    match file_writer(log_dir) {
        Ok((writer, guard)) => {
            let file = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new(FILE_DIRECTIVES));
            let _ = tracing_subscriber::registry()
                .with(console_layer())
                .with(file)
                .try_init();
            Some(guard)
        }
        Err(err) => {
            let _ = tracing_subscriber::registry()
                .with(console_layer())
                .try_init();
            warn!(dir = %log_dir.display(), error = %err, "File logging disabled");
            None
        }
    }
}

fn console_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::layer().with_writer(std::io::stderr).with_filter(filter)
}

fn file_writer(log_dir: &Path) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)?;
    let file_name = format!(".sharesync_{}.log", Local::now().format("%Y-%m-%d_%H-%M"));
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(log_dir)
        .map_err(std::io::Error::other)?;
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unusable_log_dir_falls_back_to_stderr_only() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("logs");
        std::fs::write(&not_a_dir, "occupied").unwrap();

        assert!(file_writer(&not_a_dir).is_err());
        assert!(init(&not_a_dir).is_none());
    }

    #[test]
    fn log_file_is_created_in_log_dir() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");
        let (_writer, _guard) = file_writer(&logs).unwrap();

        let names: Vec<String> = std::fs::read_dir(&logs)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with(".sharesync_"));
        assert!(names[0].ends_with(".log"));
    }
}
