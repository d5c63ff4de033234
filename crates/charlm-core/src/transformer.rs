use rand::Rng;
use tch::{nn, Device, IndexOp, Kind, Tensor};

use crate::attention::MultiHeadAttention;
use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::layer_norm::LayerNorm;
use crate::sampling::Sampler;

/// Position-wise feed-forward: n_embd -> 4 * n_embd -> ReLU -> n_embd.
pub struct FeedForward {
    c_fc: nn::Linear,
    c_proj: nn::Linear,
    dropout: f64,
}

impl FeedForward {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Self {
        let n_embd = config.n_embd;
        let n_hidden = 4 * n_embd;

        let c_fc = nn::linear(vs / "c_fc", n_embd, n_hidden, Default::default());
        let c_proj = nn::linear(vs / "c_proj", n_hidden, n_embd, Default::default());

        Self {
            c_fc,
            c_proj,
            dropout: config.dropout,
        }
    }

    pub fn forward(&self, x: &Tensor, train: bool) -> Tensor {
        x.apply(&self.c_fc)
            .relu()
            .apply(&self.c_proj)
            .dropout(self.dropout, train)
    }
}

/// Pre-norm transformer block.
pub struct Block {
    ln_1: LayerNorm,
    sa: MultiHeadAttention,
    ln_2: LayerNorm,
    ffwd: FeedForward,
}

impl Block {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Self {
        let ln_1 = LayerNorm::new(&(vs / "ln_1"), config);
        let sa = MultiHeadAttention::new(&(vs / "sa"), config);
        let ln_2 = LayerNorm::new(&(vs / "ln_2"), config);
        let ffwd = FeedForward::new(&(vs / "ffwd"), config);

        Self {
            ln_1,
            sa,
            ln_2,
            ffwd,
        }
    }

    pub fn forward(&self, x: &Tensor, train: bool) -> Tensor {
        let x = x + self.sa.forward(&self.ln_1.forward(x), train);
        let ffwd_out = self.ffwd.forward(&self.ln_2.forward(&x), train);
        x + ffwd_out
    }
}

/// Result of a forward pass.
pub struct ModelOutput {
    /// [batch, time, vocab_size]
    pub logits: Tensor,
    /// Mean cross-entropy, present when targets were supplied.
    pub loss: Option<Tensor>,
}

/// Character-level GPT.
pub struct LanguageModel {
    token_embedding: nn::Embedding,
    position_embedding: nn::Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    lm_head: nn::Linear,
    device: Device,
    pub config: ModelConfig,
}

impl LanguageModel {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Result<Self> {
        config.validate()?;

        let token_embedding = nn::embedding(
            vs / "token_embedding",
            config.vocab_size,
            config.n_embd,
            Default::default(),
        );
        let position_embedding = nn::embedding(
            vs / "position_embedding",
            config.block_size,
            config.n_embd,
            Default::default(),
        );

        let blocks = (0..config.n_layer)
            .map(|i| Block::new(&(vs / "blocks" / i), config))
            .collect();

        let ln_f = LayerNorm::new(&(vs / "ln_f"), config);
        let lm_head = nn::linear(vs / "lm_head", config.n_embd, config.vocab_size, Default::default());

        Ok(Self {
            token_embedding,
            position_embedding,
            blocks,
            ln_f,
            lm_head,
            device: vs.device(),
            config: config.clone(),
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Inference-mode forward pass (dropout disabled).
    pub fn forward(&self, idx: &Tensor, targets: Option<&Tensor>) -> Result<ModelOutput> {
        self.forward_t(idx, targets, false)
    }

    /// idx: [batch, time] token ids with 1 <= time <= block_size.
    /// targets: same shape as idx.
    pub fn forward_t(&self, idx: &Tensor, targets: Option<&Tensor>, train: bool) -> Result<ModelOutput> {
        let (b, t) = idx.size2().map_err(|_| {
            ModelError::ShapeMismatch(format!("expected [batch, time] ids, got {:?}", idx.size()))
        })?;
        if t < 1 || t > self.config.block_size {
            return Err(ModelError::ShapeMismatch(format!(
                "context length {} outside 1..={}",
                t, self.config.block_size
            )));
        }
        if let Some(targets) = targets {
            if targets.size() != idx.size() {
                return Err(ModelError::ShapeMismatch(format!(
                    "targets {:?} do not match inputs {:?}",
                    targets.size(),
                    idx.size()
                )));
            }
        }

        let tok_emb = idx.apply(&self.token_embedding);
        let pos = Tensor::arange(t, (Kind::Int64, self.device));
        let pos_emb = pos.apply(&self.position_embedding);
        let mut x = tok_emb + pos_emb;

        for block in &self.blocks {
            x = block.forward(&x, train);
        }

        let logits = self.ln_f.forward(&x).apply(&self.lm_head);

        let loss = targets.map(|targets| {
            let v = self.config.vocab_size;
            logits
                .view([b * t, v])
                .cross_entropy_for_logits(&targets.view([b * t]))
        });

        Ok(ModelOutput { logits, loss })
    }

    /// Extend every row of `idx` by `max_new_tokens` sampled ids.
    ///
    /// The context fed to the model is cropped to the last `block_size`
    /// tokens at each step. Returns [batch, time + max_new_tokens].
    pub fn generate<R: Rng + ?Sized>(
        &self,
        idx: &Tensor,
        max_new_tokens: usize,
        rng: &mut R,
    ) -> Result<Tensor> {
        let _guard = tch::no_grad_guard();

        let (_, t) = idx.size2().map_err(|_| {
            ModelError::ShapeMismatch(format!("expected [batch, time] ids, got {:?}", idx.size()))
        })?;
        if max_new_tokens > 0 && t == 0 {
            return Err(ModelError::ShapeMismatch("cannot generate from an empty prompt".to_string()));
        }

        let mut idx = idx.to_device(self.device);
        for _ in 0..max_new_tokens {
            let len = idx.size()[1];
            let window = len.min(self.config.block_size);
            let idx_cond = idx.narrow(1, len - window, window);

            let output = self.forward(&idx_cond, None)?;
            let last = output.logits.i((.., -1, ..));
            let probs = last.softmax(-1, Kind::Float);

            let next = Sampler::sample(&probs, rng)?.to_device(self.device);
            idx = Tensor::cat(&[&idx, &next], 1);
        }

        Ok(idx)
    }
}
