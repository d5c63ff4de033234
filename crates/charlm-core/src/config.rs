use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Fields missing from a serialized config take their `Default` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Width of the token/position embeddings and of the residual stream.
    pub n_embd: i64,
    /// Number of attention heads per block.
    pub n_head: i64,
    /// Number of transformer blocks.
    pub n_layer: i64,
    /// Number of distinct symbols in the vocabulary.
    pub vocab_size: i64,
    /// Maximum context window the model attends over.
    pub block_size: i64,
    /// Dropout probability (attention weights, projections, feed-forward output).
    pub dropout: f64,
    /// LayerNorm epsilon value.
    pub layer_norm_epsilon: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_embd: 184,
            n_head: 6,
            n_layer: 6,
            vocab_size: 0,
            block_size: 128,
            dropout: 0.4,
            layer_norm_epsilon: 1e-5,
        }
    }
}

impl ModelConfig {
    pub fn head_size(&self) -> i64 {
        self.n_embd / self.n_head
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(ModelError::InvalidConfig(reason));

        if self.vocab_size <= 0 {
            return invalid(format!("vocab_size must be positive, got {}", self.vocab_size));
        }
        if self.block_size <= 0 {
            return invalid(format!("block_size must be positive, got {}", self.block_size));
        }
        if self.n_layer < 0 {
            return invalid(format!("n_layer must not be negative, got {}", self.n_layer));
        }
        if self.n_head <= 0 || self.n_embd < self.n_head {
            return invalid(format!(
                "n_embd ({}) must be at least n_head ({}) and n_head must be positive",
                self.n_embd, self.n_head
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid(format!("dropout must lie in [0, 1), got {}", self.dropout));
        }
        Ok(())
    }
}
