use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use tch::Device;

use charlm_core::ModelConfig;
use tokenizer::Vocab;
use trainer::{Trainer, TrainerConfig};

#[derive(Parser)]
#[command(author, version, about = "Train the character-level language model", long_about = None)]
struct Cli {
    /// Plain-text training corpus; its characters define the vocabulary
    #[arg(short, long, default_value = "data/corpus.txt")]
    corpus: PathBuf,

    #[arg(long, default_value = "configs/model_config.yaml")]
    model_config: PathBuf,

    #[arg(long, default_value = "configs/training_config.yaml")]
    training_config: PathBuf,

    /// Snapshot to continue training from
    #[arg(long)]
    resume: Option<PathBuf>,
}

fn read_yaml_or_default<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if path.exists() {
        let content = fs::read_to_string(path)?;
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    } else {
        Ok(T::default())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let text = fs::read_to_string(&cli.corpus)
        .with_context(|| format!("Failed to read corpus {:?}", cli.corpus))?;
    let vocab = Vocab::from_text(&text);
    info!("Vocabulary of {} symbols built from {:?}", vocab.len(), cli.corpus);

    let mut model_config: ModelConfig = read_yaml_or_default(&cli.model_config)?;
    model_config.vocab_size = vocab.len() as i64;
    let trainer_config: TrainerConfig = read_yaml_or_default(&cli.training_config)?;

    let device = Device::cuda_if_available();
    info!("Using device: {:?}", device);

    let mut rng = StdRng::seed_from_u64(trainer_config.seed);
    let mut trainer = match &cli.resume {
        Some(snapshot) => {
            info!("Resuming from {:?}", snapshot);
            Trainer::resume(model_config, trainer_config, vocab, device, snapshot)?
        }
        None => Trainer::new(model_config, trainer_config, vocab, device)?,
    };

    let summary = trainer.train(&text, &mut rng)?;
    if let Some(losses) = summary.last_estimate {
        info!("Final train loss {:.4}, val loss {:.4}", losses.train, losses.val);
    }
    info!("Training complete, weights in {:?}", summary.checkpoint);

    Ok(())
}
