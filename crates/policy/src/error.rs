use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("stats serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("stats I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PolicyError>;
