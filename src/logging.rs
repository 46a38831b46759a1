//! Tracing subscriber setup for the binary.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Keeps the non-blocking file writer alive. Drop to flush.
pub struct LogGuard {
  _guard: Option<WorkerGuard>,
}

/// `RUST_LOG` when set, otherwise the configured level.
fn env_filter(level: &str) -> EnvFilter {
  EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(level))
    .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber: compact stderr output, plus a daily-rolling
/// file under `config.dir` when set.
pub fn init(config: &LoggingConfig) -> Result<LogGuard> {
  let console_layer = fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(true)
    .compact();

  let (file_layer, guard) = match &config.dir {
    Some(dir) => {
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let appender = tracing_appender::rolling::daily(dir, "folio.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);

      let layer = if config.json {
        fmt::layer()
          .with_writer(writer)
          .json()
          .with_target(true)
          .with_file(true)
          .with_line_number(true)
          .boxed()
      } else {
        fmt::layer()
          .with_writer(writer)
          .with_ansi(false)
          .with_target(true)
          .with_file(true)
          .with_line_number(true)
          .boxed()
      };
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(env_filter(&config.level))
    .with(console_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  tracing::debug!(level = %config.level, dir = ?config.dir, "logging initialized");

  Ok(LogGuard { _guard: guard })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_invalid_level_falls_back() {
    // Must not panic on garbage
    let _ = env_filter("not a level [[[");
  }
}
