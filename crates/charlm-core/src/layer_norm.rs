use tch::{nn, Tensor};
use crate::config::ModelConfig;

/// LayerNorm over the embedding axis with a learned scale and shift.
#[derive(Debug)]
pub struct LayerNorm {
    weight: Tensor,
    bias: Tensor,
    n_embd: i64,
    eps: f64,
}

impl LayerNorm {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Self {
        let weight = vs.var("weight", &[config.n_embd], nn::Init::Const(1.0));
        let bias = vs.var("bias", &[config.n_embd], nn::Init::Const(0.0));
        Self {
            weight,
            bias,
            n_embd: config.n_embd,
            eps: config.layer_norm_epsilon,
        }
    }

    /// x: [batch, seq_len, n_embd]
    pub fn forward(&self, x: &Tensor) -> Tensor {
        x.layer_norm(&[self.n_embd], Some(&self.weight), Some(&self.bias), self.eps, false)
    }
}
