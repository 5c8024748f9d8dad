//! Logging setup
//!
//! Logs go to a daily rolling file under `~/.kode/logs/`, so they never mix
//! with command output. `RUST_LOG` overrides the default `info` filter.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::config::KODE_DIR;
use crate::core::{GuardError, GuardResult};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info";

/// File name prefix of the rolling log
pub const LOG_FILE_PREFIX: &str = "shadow-guard.log";

/// `<home>/.kode/logs`
pub fn log_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(KODE_DIR).join("logs")
}

/// `RUST_LOG` if set and valid, else `default`
pub fn build_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber writing to `log_dir(home_dir)`.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the background writer.
pub fn init_logging(home_dir: &Path) -> GuardResult<WorkerGuard> {
    let dir = log_dir(home_dir);
    std::fs::create_dir_all(&dir)?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(build_filter(DEFAULT_FILTER))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| GuardError::other(format!("failed to initialize logging: {}", e)))?;

    tracing::debug!("[Logging] Writing logs to {}", dir.display());
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir() {
        assert_eq!(
            log_dir(Path::new("/home/me")),
            PathBuf::from("/home/me/.kode/logs")
        );
    }

    #[test]
    fn test_build_filter_falls_back() {
        let filter = build_filter("shadow_guard=debug");
        assert!(!filter.to_string().is_empty());
    }
}
