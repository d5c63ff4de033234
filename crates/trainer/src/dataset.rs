use anyhow::{bail, Result};
use rand::Rng;
use tch::{Device, Tensor};

/// Which partition a batch is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Val,
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Val => write!(f, "val"),
        }
    }
}

/// Input ids and next-token targets, both [batch_size, block_size].
pub struct Batch {
    pub context: Tensor,
    pub target: Tensor,
}

pub struct TextDataset {
    tokens: Vec<i64>,
    block_size: usize,
    device: Device,
}

impl TextDataset {
    pub fn new(tokens: Vec<i64>, block_size: usize, device: Device) -> Self {
        Self {
            tokens,
            block_size,
            device,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Split into a leading training part and a trailing validation part.
    pub fn split(self, train_fraction: f64) -> (TextDataset, TextDataset) {
        let n = (train_fraction * self.tokens.len() as f64) as usize;
        let n = n.min(self.tokens.len());
        let mut train = self.tokens;
        let val = train.split_off(n);
        (
            TextDataset::new(train, self.block_size, self.device),
            TextDataset::new(val, self.block_size, self.device),
        )
    }

    /// Sample `batch_size` windows uniformly, with replacement.
    /// target[i][t] is the token following context[i][t].
    pub fn sample_batch<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Batch> {
        if self.tokens.len() <= self.block_size {
            bail!(
                "dataset of {} tokens is too short for a context of {}",
                self.tokens.len(),
                self.block_size
            );
        }
        let max_start = self.tokens.len() - self.block_size;

        let mut inputs = Vec::with_capacity(batch_size * self.block_size);
        let mut targets = Vec::with_capacity(batch_size * self.block_size);

        for _ in 0..batch_size {
            let start = rng.gen_range(0..max_start);
            let chunk = &self.tokens[start..start + self.block_size + 1];

            inputs.extend_from_slice(&chunk[..self.block_size]);
            targets.extend_from_slice(&chunk[1..]);
        }

        let shape = [batch_size as i64, self.block_size as i64];
        let context = Tensor::from_slice(&inputs).view(shape).to(self.device);
        let target = Tensor::from_slice(&targets).view(shape).to(self.device);

        Ok(Batch { context, target })
    }
}
