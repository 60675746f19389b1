use thiserror::Error;

#[derive(Debug, Error)]
pub enum TicklerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TicklerError>;
