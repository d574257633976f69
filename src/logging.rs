//! Subscriber setup for the binary. The library only emits events.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;
use crate::error::{ApiError, Result};

const LOG_FILE_PREFIX: &str = "investi.log";

/// Build the filter: RUST_LOG wins, then the configured level.
pub fn env_filter(config: &LogConfig) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber.
///
/// Logs go to stderr, or to a daily-rotated file when `log.file` is set. Keep
/// the returned guard alive until exit so buffered file output is flushed.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
  let registry = tracing_subscriber::registry().with(env_filter(config));

  match &config.file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));
      std::fs::create_dir_all(&dir).map_err(|e| {
        ApiError::Config(format!("Failed to create log directory {}: {}", dir.display(), e))
      })?;

      let prefix = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| LOG_FILE_PREFIX.to_string());
      let appender = tracing_appender::rolling::daily(dir, prefix);
      let (writer, guard) = tracing_appender::non_blocking(appender);

      registry
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| ApiError::Config(format!("Failed to install logger: {}", e)))?;
      Ok(Some(guard))
    }
    None => {
      registry
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| ApiError::Config(format!("Failed to install logger: {}", e)))?;
      Ok(None)
    }
  }
}
