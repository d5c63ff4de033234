use charlm_core::snapshot::{save_snapshot, write_latest_pointer};
use charlm_core::{LanguageModel, ModelConfig};
use inference::evaluation::parse_records;
use inference::{load_model, Evaluator, Generator, InferenceError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tch::{nn, Device, Tensor};
use tokenizer::Vocab;

const ALPHABET: &str = "\n 0123456789+=ANSEDTOP";

fn write_checkpoint(dir: &std::path::Path, vocab: &Vocab) -> ModelConfig {
    tch::manual_seed(21);
    let config = ModelConfig {
        n_embd: 8,
        n_head: 2,
        n_layer: 1,
        vocab_size: vocab.len() as i64,
        block_size: 8,
        dropout: 0.0,
        layer_norm_epsilon: 1e-5,
    };
    let vs = nn::VarStore::new(Device::Cpu);
    let _model = LanguageModel::new(&vs.root(), &config).unwrap();
    save_snapshot(&vs, dir.join("checkpoint_000001.safetensors"), &vocab.alphabet()).unwrap();
    std::fs::write(dir.join("config.json"), serde_json::to_string(&config).unwrap()).unwrap();
    vocab.save(dir.join("vocab.json")).unwrap();
    config
}

#[test]
fn test_load_and_score() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = Vocab::from_text(ALPHABET);
    write_checkpoint(dir.path(), &vocab);

    let loaded = load_model(dir.path(), Device::Cpu).unwrap();
    assert_eq!(loaded.vocab, vocab);

    let records = parse_records("1 + 2 = ANS3\nEND\n10 + 0 = ANS10\nEND\nSTOP").unwrap();
    let evaluator = Evaluator::new(Generator::new(&loaded.model, &loaded.vocab));
    let mut rng = StdRng::seed_from_u64(5);
    let report = evaluator.run(&records, &mut rng).unwrap();

    assert_eq!(report.outcomes.len(), 2);
    let total: f64 = report.outcomes.iter().map(|o| o.penalty).sum();
    assert!((report.score - total).abs() < 1e-9);
    for outcome in &report.outcomes {
        assert!(outcome.penalty >= 0.0 && outcome.penalty <= 50_000.0);
        // "\n" + prompt + budget; the second chunk starts after "\nEND" with its own newline
        let prompt_len = if outcome.index == 0 { 8 } else { 10 };
        let answer_len = if outcome.index == 0 { 1 } else { 2 };
        assert_eq!(outcome.output.chars().count(), 1 + prompt_len + prompt_len + answer_len + 3);
    }
}

#[test]
fn test_generator_keeps_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = Vocab::from_text(ALPHABET);
    write_checkpoint(dir.path(), &vocab);
    let loaded = load_model(dir.path(), Device::Cpu).unwrap();

    let generator = Generator::new(&loaded.model, &loaded.vocab);
    let mut rng = StdRng::seed_from_u64(6);
    let text = generator.complete("\n12 + 7 = ", 5, &mut rng).unwrap();
    assert!(text.starts_with("\n12 + 7 = "));
    assert_eq!(text.chars().count(), 10 + 5);
}

#[test]
fn test_prompt_outside_vocabulary() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = Vocab::from_text(ALPHABET);
    write_checkpoint(dir.path(), &vocab);
    let loaded = load_model(dir.path(), Device::Cpu).unwrap();

    let generator = Generator::new(&loaded.model, &loaded.vocab);
    let mut rng = StdRng::seed_from_u64(7);
    assert!(matches!(
        generator.complete("3 * 4 = ", 2, &mut rng),
        Err(InferenceError::Tokenizer(_))
    ));
}

#[test]
fn test_vocab_file_must_match_config() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = Vocab::from_text(ALPHABET);
    write_checkpoint(dir.path(), &vocab);
    Vocab::from_text("0123").save(dir.path().join("vocab.json")).unwrap();

    assert!(matches!(
        load_model(dir.path(), Device::Cpu),
        Err(InferenceError::VocabSizeMismatch { .. })
    ));
}

#[test]
fn test_missing_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = Vocab::from_text(ALPHABET);
    write_checkpoint(dir.path(), &vocab);
    std::fs::remove_file(dir.path().join("checkpoint_000001.safetensors")).unwrap();

    assert!(matches!(
        load_model(dir.path(), Device::Cpu),
        Err(InferenceError::MissingCheckpoint(_))
    ));
}

fn logits_for_seed(config: &ModelConfig, seed: i64, dir: &std::path::Path, name: &str, vocab: &Vocab) -> Tensor {
    tch::manual_seed(seed);
    let vs = nn::VarStore::new(Device::Cpu);
    let model = LanguageModel::new(&vs.root(), config).unwrap();
    save_snapshot(&vs, dir.join(name), &vocab.alphabet()).unwrap();
    let idx = Tensor::from_slice(&[0i64, 1, 2, 3]).view([1, 4]);
    model.forward(&idx, None).unwrap().logits
}

#[test]
fn test_latest_pointer_beats_checkpoint_number() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = Vocab::from_text(ALPHABET);
    let config = write_checkpoint(dir.path(), &vocab);
    std::fs::remove_file(dir.path().join("checkpoint_000001.safetensors")).unwrap();

    // An older run reached iteration 6; a resumed run then restarted its count.
    let stale = logits_for_seed(&config, 40, dir.path(), "checkpoint_000006.safetensors", &vocab);
    let fresh = logits_for_seed(&config, 41, dir.path(), "checkpoint_000004.safetensors", &vocab);
    write_latest_pointer(dir.path(), &dir.path().join("checkpoint_000004.safetensors")).unwrap();
    assert!(!stale.allclose(&fresh, 1e-6, 1e-6, false));

    let loaded = load_model(dir.path(), Device::Cpu).unwrap();
    let idx = Tensor::from_slice(&[0i64, 1, 2, 3]).view([1, 4]);
    let logits = loaded.model.forward(&idx, None).unwrap().logits;
    assert!(logits.allclose(&fresh, 1e-6, 1e-6, false));
}

#[test]
fn test_highest_number_without_pointer() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = Vocab::from_text(ALPHABET);
    let config = write_checkpoint(dir.path(), &vocab);
    let newest = logits_for_seed(&config, 42, dir.path(), "checkpoint_000009.safetensors", &vocab);

    let loaded = load_model(dir.path(), Device::Cpu).unwrap();
    let idx = Tensor::from_slice(&[0i64, 1, 2, 3]).view([1, 4]);
    let logits = loaded.model.forward(&idx, None).unwrap().logits;
    assert!(logits.allclose(&newest, 1e-6, 1e-6, false));
}

#[test]
fn test_pointer_to_missing_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = Vocab::from_text(ALPHABET);
    write_checkpoint(dir.path(), &vocab);
    std::fs::write(dir.path().join("latest"), "checkpoint_000099.safetensors").unwrap();

    assert!(matches!(
        load_model(dir.path(), Device::Cpu),
        Err(InferenceError::MissingCheckpoint(_))
    ));
}
