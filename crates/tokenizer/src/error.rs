use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Symbol {0:?} is not part of the vocabulary")]
    UnknownSymbol(char),

    #[error("Token id {0} is out of range")]
    UnknownId(u32),

    #[error("Vocabulary entry {0:?} is not a single character")]
    InvalidEntry(String),

    #[error("Duplicate vocabulary entry {0:?}")]
    DuplicateSymbol(char),
}

pub type Result<T> = std::result::Result<T, TokenizerError>;
