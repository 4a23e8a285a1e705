use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Batch of {size} records exceeds backend limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Invalid project id: {0}")]
    InvalidProject(String),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, DocumentStoreError>;
