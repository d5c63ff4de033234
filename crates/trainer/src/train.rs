use anyhow::{bail, ensure, Context, Result};
use log::{info, warn};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tch::{nn, nn::OptimizerConfig, Device};

use charlm_core::snapshot::{load_snapshot, save_snapshot, write_latest_pointer};
use charlm_core::{LanguageModel, ModelConfig};
use tokenizer::Vocab;

use crate::dataset::{Split, TextDataset};
use crate::TrainerConfig;

/// Mean loss over `eval_iters` batches of each partition.
#[derive(Debug, Clone, Copy)]
pub struct LossEstimate {
    pub train: f64,
    pub val: f64,
}

#[derive(Debug)]
pub struct TrainingSummary {
    pub last_estimate: Option<LossEstimate>,
    pub checkpoint: PathBuf,
}

pub struct Trainer {
    config: TrainerConfig,
    model: LanguageModel,
    optimizer: nn::Optimizer,
    vocab: Vocab,
    device: Device,
    vs: nn::VarStore,
}

impl Trainer {
    pub fn new(
        model_config: ModelConfig,
        trainer_config: TrainerConfig,
        vocab: Vocab,
        device: Device,
    ) -> Result<Self> {
        ensure!(
            model_config.vocab_size == vocab.len() as i64,
            "model vocab_size {} does not match vocabulary of {} symbols",
            model_config.vocab_size,
            vocab.len()
        );

        tch::manual_seed(trainer_config.seed as i64);

        let vs = nn::VarStore::new(device);
        let model = LanguageModel::new(&vs.root(), &model_config)?;

        let optimizer = nn::AdamW {
            wd: trainer_config.weight_decay.unwrap_or(0.0),
            ..Default::default()
        }
        .build(&vs, trainer_config.learning_rate)?;

        Ok(Self {
            config: trainer_config,
            model,
            optimizer,
            vocab,
            device,
            vs,
        })
    }

    /// Continue training from a saved snapshot.
    pub fn resume(
        model_config: ModelConfig,
        trainer_config: TrainerConfig,
        vocab: Vocab,
        device: Device,
        snapshot: &Path,
    ) -> Result<Self> {
        let mut trainer = Self::new(model_config, trainer_config, vocab, device)?;
        let alphabet = trainer.vocab.alphabet();
        load_snapshot(&mut trainer.vs, snapshot, &alphabet)
            .with_context(|| format!("Failed to restore snapshot {:?}", snapshot))?;
        Ok(trainer)
    }

    pub fn model(&self) -> &LanguageModel {
        &self.model
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn estimate_loss<R: Rng + ?Sized>(
        &self,
        train: &TextDataset,
        val: &TextDataset,
        rng: &mut R,
    ) -> Result<LossEstimate> {
        let _guard = tch::no_grad_guard();
        let iters = self.config.eval_iters.max(1);

        let mut mean = |dataset: &TextDataset, split: Split| -> Result<f64> {
            let mut total = 0.0;
            for _ in 0..iters {
                let batch = dataset
                    .sample_batch(self.config.batch_size, rng)
                    .with_context(|| format!("Failed to sample a {} batch", split))?;
                let output = self.model.forward(&batch.context, Some(&batch.target))?;
                if let Some(loss) = output.loss {
                    total += loss.double_value(&[]);
                }
            }
            Ok(total / iters as f64)
        };

        let train_loss = mean(train, Split::Train)?;
        let val_loss = mean(val, Split::Val)?;
        Ok(LossEstimate {
            train: train_loss,
            val: val_loss,
        })
    }

    pub fn train<R: Rng + ?Sized>(&mut self, text: &str, rng: &mut R) -> Result<TrainingSummary> {
        let tokens: Vec<i64> = self
            .vocab
            .encode(text)
            .context("Corpus contains symbols outside the vocabulary")?
            .into_iter()
            .map(|t| t as i64)
            .collect();

        let block_size = self.model.config.block_size as usize;
        let (train_data, val_data) =
            TextDataset::new(tokens, block_size, self.device).split(self.config.train_fraction);

        info!(
            "Training on {} tokens, validating on {} tokens: {:?}",
            train_data.len(),
            val_data.len(),
            self.config
        );

        let start = Instant::now();
        let mut last_estimate = None;
        let max_iters = self.config.max_iters;

        for iter in 0..max_iters {
            let eval_due = self.config.eval_interval > 0 && iter % self.config.eval_interval == 0;
            if eval_due || iter + 1 == max_iters {
                let losses = self.estimate_loss(&train_data, &val_data, rng)?;
                info!(
                    "step {}: train loss {:.4}, val loss {:.4} ({:.1}s elapsed)",
                    iter,
                    losses.train,
                    losses.val,
                    start.elapsed().as_secs_f64()
                );
                last_estimate = Some(losses);
            }

            let batch = train_data.sample_batch(self.config.batch_size, rng)?;
            let output = self.model.forward_t(&batch.context, Some(&batch.target), true)?;
            let loss = match output.loss {
                Some(loss) => loss,
                None => bail!("forward pass returned no loss"),
            };

            let loss_val = loss.double_value(&[]);
            if !loss_val.is_finite() {
                bail!("training diverged at step {}: loss {}", iter, loss_val);
            }

            self.optimizer.backward_step(&loss);

            if self.config.save_every > 0 && (iter + 1) % self.config.save_every == 0 && iter + 1 < max_iters {
                self.save_checkpoint(iter + 1)?;
            }
        }

        if last_estimate.is_none() {
            warn!("No loss estimate was taken (max_iters = {})", max_iters);
        }

        let checkpoint = self.save_checkpoint(max_iters)?;
        Ok(TrainingSummary {
            last_estimate,
            checkpoint,
        })
    }

    pub fn save_checkpoint(&self, iter: usize) -> Result<PathBuf> {
        let path = PathBuf::from(&self.config.checkpoint_dir);
        if !path.exists() {
            std::fs::create_dir_all(&path)?;
        }

        let filename = path.join(format!("checkpoint_{:06}.safetensors", iter));
        save_snapshot(&self.vs, &filename, &self.vocab.alphabet())?;
        write_latest_pointer(&path, &filename)?;

        let config_json = serde_json::to_string_pretty(&self.model.config)?;
        std::fs::write(path.join("config.json"), config_json)?;
        self.vocab.save(path.join("vocab.json"))?;

        info!("Saved checkpoint {:?}", filename);
        Ok(filename)
    }
}
