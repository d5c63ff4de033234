use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use tch::{Device, Kind, Tensor};

use crate::error::{ModelError, Result};

pub struct Sampler;

impl Sampler {
    /// Draw one id per row from a categorical distribution.
    /// probs: [batch, vocab_size], each row summing to one.
    /// Returns: [batch, 1] Int64 tensor on the CPU.
    pub fn sample<R: Rng + ?Sized>(probs: &Tensor, rng: &mut R) -> Result<Tensor> {
        let (batch, vocab) = probs.size2().map_err(|_| {
            ModelError::ShapeMismatch(format!("expected [batch, vocab] probabilities, got {:?}", probs.size()))
        })?;

        // WeightedIndex needs host memory; vocabularies here are tiny.
        let flat = probs
            .to_device(Device::Cpu)
            .to_kind(Kind::Double)
            .contiguous()
            .view([-1]);
        let values = Vec::<f64>::try_from(&flat)?;

        let mut picked = Vec::with_capacity(batch as usize);
        for (row, weights) in values.chunks(vocab.max(1) as usize).enumerate() {
            if weights.iter().any(|p| !p.is_finite()) {
                return Err(ModelError::Sampling(format!("row {} holds non-finite probabilities", row)));
            }
            let dist = WeightedIndex::new(weights)
                .map_err(|e| ModelError::Sampling(format!("row {}: {}", row, e)))?;
            picked.push(dist.sample(rng) as i64);
        }

        Ok(Tensor::from_slice(&picked).view([batch, 1]))
    }
}
