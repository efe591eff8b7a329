//! Logging setup.
//!
//! Every cycle action goes to a timestamped text stream on stdout, and
//! optionally to an append-only log file as well.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::Result;
use crate::utils::error::AppError;

const DEFAULT_DIRECTIVE: &str = "stock_watcher=info";

#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Append log lines to this file in addition to stdout.
    pub log_file: Option<PathBuf>,
    /// Overrides `RUST_LOG` when set.
    pub directive: Option<String>,
}

/// Build the env filter, falling back to `stock_watcher=info` when neither
/// the caller nor `RUST_LOG` names a level.
pub fn build_filter(directive: Option<&str>) -> Result<EnvFilter> {
    let filter = match directive {
        Some(d) => EnvFilter::try_new(d)
            .map_err(|e| AppError::Validation(format!("invalid log directive '{}': {}", d, e)))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    };
    Ok(filter)
}

/// Install the global subscriber. The returned guard must be held for the
/// lifetime of the process so buffered file writes are flushed on exit.
pub fn init(options: &LoggingOptions) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(options.directive.as_deref())?;
    let stdout_layer = fmt::layer().with_target(false);

    match &options.log_file {
        Some(path) => {
            let (dir, file_name) = split_log_path(path)?;
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(fmt::layer().with_ansi(false).with_target(false).with_writer(writer))
                .try_init()
                .map_err(|e| AppError::Validation(format!("logging already initialised: {}", e)))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .try_init()
                .map_err(|e| AppError::Validation(format!("logging already initialised: {}", e)))?;
            Ok(None)
        }
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, String)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::Validation(format!("log file path has no file name: {}", path.display())))?
        .to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_path_with_directory() {
        let (dir, name) = split_log_path(Path::new("logs/watcher.log")).unwrap();
        assert_eq!(dir, PathBuf::from("logs"));
        assert_eq!(name, "watcher.log");
    }

    #[test]
    fn test_split_log_path_bare_file() {
        let (dir, name) = split_log_path(Path::new("watcher.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "watcher.log");
    }

    #[test]
    fn test_explicit_directive() {
        assert!(build_filter(Some("stock_watcher=debug")).is_ok());
    }
}
