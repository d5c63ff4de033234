use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("Snapshot mismatch: {0}")]
    SnapshotMismatch(String),

    #[error("Cannot sample next token: {0}")]
    Sampling(String),

    #[error("Torch error: {0}")]
    Torch(#[from] tch::TchError),

    #[error("Safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
