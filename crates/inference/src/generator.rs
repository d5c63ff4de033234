use charlm_core::LanguageModel;
use rand::Rng;
use tch::Tensor;
use tokenizer::Vocab;

use crate::error::Result;

/// Text-in, text-out wrapper around `LanguageModel::generate`.
pub struct Generator<'a> {
    model: &'a LanguageModel,
    vocab: &'a Vocab,
}

impl<'a> Generator<'a> {
    pub fn new(model: &'a LanguageModel, vocab: &'a Vocab) -> Self {
        Self { model, vocab }
    }

    /// Returns the prompt followed by `max_new_tokens` sampled characters.
    pub fn complete<R: Rng + ?Sized>(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        rng: &mut R,
    ) -> Result<String> {
        let ids: Vec<i64> = self.vocab.encode(prompt)?.into_iter().map(|id| id as i64).collect();
        let input = Tensor::from_slice(&ids)
            .view([1, ids.len() as i64])
            .to(self.model.device());

        let output = self.model.generate(&input, max_new_tokens, rng)?;
        let out_ids: Vec<u32> = Vec::<i64>::try_from(&output.view([-1]).to_device(tch::Device::Cpu))
            .map_err(charlm_core::ModelError::from)?
            .into_iter()
            .map(|id| id as u32)
            .collect();

        Ok(self.vocab.decode(&out_ids)?)
    }
}
