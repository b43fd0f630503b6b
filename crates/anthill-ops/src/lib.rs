//! Operational helpers: logging, log directory setup, telemetry recording.

use std::path::{Path, PathBuf};

use anthill_types::{config::OpsConfig, AnthillError, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod recorder;

pub use recorder::{FrameSample, TelemetryRecorder, RESERVED_METRICS};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| AnthillError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| AnthillError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

/// Creates the archive directory if needed and returns it.
pub fn ensure_log_dir<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let dir = path.as_ref().to_path_buf();
    std::fs::create_dir_all(&dir)
        .map_err(|err| AnthillError::Ops(format!("failed to create log dir: {err}")))?;
    info!("Log directory ready at {:?}", dir);
    Ok(dir)
}
