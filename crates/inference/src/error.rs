use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Malformed evaluation record {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("No .safetensors checkpoint in {0:?}")]
    MissingCheckpoint(std::path::PathBuf),

    #[error("Checkpoint config expects {expected} symbols, vocabulary has {actual}")]
    VocabSizeMismatch { expected: i64, actual: usize },

    #[error(transparent)]
    Tokenizer(#[from] tokenizer::TokenizerError),

    #[error(transparent)]
    Model(#[from] charlm_core::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InferenceError>;
