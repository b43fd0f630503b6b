use thiserror::Error;

pub type Result<T, E = AnthillError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum AnthillError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid archive identifier: {0}")]
    InvalidIdentifier(String),
    #[error("archive not found: {0}")]
    NotFound(String),
    #[error("corrupt archive {identifier}: {reason}")]
    Corrupt { identifier: String, reason: String },
    #[error("persistence write failed: {0}")]
    PersistenceWrite(String),
    #[error("invalid telemetry snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
