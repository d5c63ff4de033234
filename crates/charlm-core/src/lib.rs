pub mod attention;
pub mod config;
pub mod error;
pub mod layer_norm;
pub mod sampling;
pub mod snapshot;
pub mod transformer;

pub use attention::{causal_mask, Head, MultiHeadAttention};
pub use config::ModelConfig;
pub use error::{ModelError, Result};
pub use sampling::Sampler;
pub use transformer::{Block, FeedForward, LanguageModel, ModelOutput};
