pub mod dataset;
pub mod train;

pub use dataset::{Batch, Split, TextDataset};
pub use train::{LossEstimate, Trainer, TrainingSummary};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub max_iters: usize,
    /// Steps between two held-out loss estimates.
    pub eval_interval: usize,
    /// Batches averaged per split when estimating loss.
    pub eval_iters: usize,
    /// Leading share of the corpus used for training; the rest is validation.
    pub train_fraction: f64,
    /// Steps between checkpoints; 0 keeps only the final one.
    pub save_every: usize,
    pub checkpoint_dir: String,
    pub seed: u64,
    pub weight_decay: Option<f64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 5e-4,
            batch_size: 32,
            max_iters: 107501,
            eval_interval: 500,
            eval_iters: 200,
            train_fraction: 0.9,
            save_every: 10000,
            checkpoint_dir: "./checkpoints".to_string(),
            seed: 1337,
            weight_decay: Some(0.01),
        }
    }
}
