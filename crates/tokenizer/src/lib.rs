pub mod error;
pub mod vocab;

pub use vocab::Vocab;
pub use error::TokenizerError;
