use tch::{nn, Device, Kind, Tensor};
use crate::config::ModelConfig;

/// Lower-triangular boolean mask: entry (i, j) is true when position i may
/// attend to position j, i.e. j <= i. The diagonal is always allowed, so no
/// softmax row is fully masked.
pub fn causal_mask(size: i64, device: Device) -> Tensor {
    Tensor::ones(&[size, size], (Kind::Bool, device)).tril(0)
}

/// One head of causal self-attention.
pub struct Head {
    key: nn::Linear,
    query: nn::Linear,
    value: nn::Linear,
    tril: Tensor,
    head_size: i64,
    dropout: f64,
}

impl Head {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Self {
        let head_size = config.head_size();
        let no_bias = nn::LinearConfig {
            bias: false,
            ..Default::default()
        };

        let key = nn::linear(vs / "key", config.n_embd, head_size, no_bias);
        let query = nn::linear(vs / "query", config.n_embd, head_size, no_bias);
        let value = nn::linear(vs / "value", config.n_embd, head_size, no_bias);

        Self {
            key,
            query,
            value,
            tril: causal_mask(config.block_size, vs.device()),
            head_size,
            dropout: config.dropout,
        }
    }

    /// x: [batch, time, n_embd] -> [batch, time, head_size]
    pub fn forward(&self, x: &Tensor, train: bool) -> Tensor {
        let t = x.size()[1];

        let k = x.apply(&self.key);
        let q = x.apply(&self.query);
        let v = x.apply(&self.value);

        // [batch, time, time]
        let att = q.matmul(&k.transpose(-2, -1)) * (1.0 / (self.head_size as f64).sqrt());

        let mask = self.tril.narrow(0, 0, t).narrow(1, 0, t);
        let att = att.masked_fill(&mask.logical_not(), f64::NEG_INFINITY);
        let att = att.softmax(-1, Kind::Float);
        let att = att.dropout(self.dropout, train);

        att.matmul(&v)
    }
}

/// Independent heads run side by side, concatenated and projected back to
/// `n_embd`.
pub struct MultiHeadAttention {
    heads: Vec<Head>,
    proj: nn::Linear,
    dropout: f64,
}

impl MultiHeadAttention {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Self {
        let heads_vs = vs / "heads";
        let heads = (0..config.n_head)
            .map(|i| Head::new(&(&heads_vs / i), config))
            .collect();

        // n_head * head_size can fall short of n_embd when the width is not a
        // multiple of the head count.
        let concat_width = config.n_head * config.head_size();
        let proj = nn::linear(vs / "proj", concat_width, config.n_embd, Default::default());

        Self {
            heads,
            proj,
            dropout: config.dropout,
        }
    }

    pub fn forward(&self, x: &Tensor, train: bool) -> Tensor {
        let outs: Vec<Tensor> = self.heads.iter().map(|h| h.forward(x, train)).collect();
        Tensor::cat(&outs, -1)
            .apply(&self.proj)
            .dropout(self.dropout, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            n_embd: 8,
            n_head: 2,
            n_layer: 1,
            vocab_size: 4,
            block_size: 4,
            dropout: 0.0,
            layer_norm_epsilon: 1e-5,
        }
    }

    #[test]
    fn test_mask_rows_have_diagonal() {
        let mask = causal_mask(5, Device::Cpu);
        for i in 0..5 {
            assert!(mask.int64_value(&[i, i]) != 0);
            for j in 0..5 {
                let allowed = mask.int64_value(&[i, j]) != 0;
                assert_eq!(allowed, j <= i, "entry ({}, {})", i, j);
            }
        }
    }

    #[test]
    fn test_head_output_shape() {
        tch::manual_seed(0);
        let vs = nn::VarStore::new(Device::Cpu);
        let config = tiny_config();
        let head = Head::new(&vs.root(), &config);
        let x = Tensor::randn(&[3, 4, 8], (Kind::Float, Device::Cpu));
        assert_eq!(head.forward(&x, false).size(), vec![3, 4, 4]);
    }

    #[test]
    fn test_first_position_attends_only_to_itself() {
        tch::manual_seed(1);
        let vs = nn::VarStore::new(Device::Cpu);
        let config = tiny_config();
        let head = Head::new(&vs.root(), &config);

        let x = Tensor::randn(&[1, 3, 8], (Kind::Float, Device::Cpu));
        let out = head.forward(&x, false);
        let v0 = x.narrow(1, 0, 1).apply(&head.value);
        let diff = (out.narrow(1, 0, 1) - v0).abs().max().double_value(&[]);
        assert!(diff < 1e-5, "diff {}", diff);
    }

    #[test]
    fn test_multi_head_restores_width() {
        tch::manual_seed(2);
        let vs = nn::VarStore::new(Device::Cpu);
        let config = tiny_config();
        let mha = MultiHeadAttention::new(&vs.root(), &config);
        let x = Tensor::randn(&[2, 4, 8], (Kind::Float, Device::Cpu));
        assert_eq!(mha.forward(&x, true).size(), vec![2, 4, 8]);
    }
}
