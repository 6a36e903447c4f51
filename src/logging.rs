use crate::errors::{StoreError, StoreResult};
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;

pub const LOG_FILE_PREFIX: &str = "viewtree.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs a JSON subscriber writing to a daily rolling file under `log_dir`.
/// `RUST_LOG` overrides the default `info` filter. Fails if a global
/// subscriber is already set.
pub fn init_tracing(log_dir: &Path) -> StoreResult<()> {
    std::fs::create_dir_all(log_dir)
        .map_err(|error| StoreError::Io(format!("{}: {}", log_dir.to_string_lossy(), error)))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| StoreError::Internal(error.to_string()))
}
