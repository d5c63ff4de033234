use std::path::{Path, PathBuf};

use tch::Device;
use tracing::info;

use charlm_core::{snapshot, LanguageModel, ModelConfig};
use tokenizer::Vocab;

pub mod error;
pub mod evaluation;
pub mod generator;

pub use error::{InferenceError, Result};
pub use evaluation::{EvalRecord, EvalReport, Evaluator, RecordOutcome};
pub use generator::Generator;

/// A model restored from a checkpoint together with the vocabulary it was
/// trained on.
pub struct LoadedModel {
    pub model: LanguageModel,
    pub vocab: Vocab,
}

/// Build the architecture from `config.json`, then restore the latest
/// `.safetensors` snapshot in `dir` into it.
pub fn load_model(dir: &Path, device: Device) -> Result<LoadedModel> {
    let config_str = std::fs::read_to_string(dir.join("config.json"))?;
    let config: ModelConfig = serde_json::from_str(&config_str)?;
    let vocab = Vocab::load(dir.join("vocab.json"))?;

    if config.vocab_size != vocab.len() as i64 {
        return Err(InferenceError::VocabSizeMismatch {
            expected: config.vocab_size,
            actual: vocab.len(),
        });
    }

    let checkpoint = latest_checkpoint(dir)?;

    let mut vs = tch::nn::VarStore::new(device);
    let model = LanguageModel::new(&vs.root(), &config)?;

    info!("Loading weights from {:?}", checkpoint);
    snapshot::load_snapshot(&mut vs, &checkpoint, &vocab.alphabet())?;

    Ok(LoadedModel { model, vocab })
}

/// Snapshot named by the directory's `latest` pointer. Directories without a
/// pointer fall back to the highest-numbered `.safetensors` file.
pub fn latest_checkpoint(dir: &Path) -> Result<PathBuf> {
    if let Some(checkpoint) = snapshot::read_latest_pointer(dir)? {
        if !checkpoint.is_file() {
            return Err(InferenceError::MissingCheckpoint(checkpoint));
        }
        return Ok(checkpoint);
    }

    let mut checkpoints: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "safetensors"))
        .collect();
    checkpoints.sort();
    checkpoints
        .pop()
        .ok_or_else(|| InferenceError::MissingCheckpoint(dir.to_path_buf()))
}
