use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tch::Device;
use tracing::info;

use inference::evaluation::parse_records;
use inference::{load_model, Evaluator, Generator};

#[derive(Parser)]
#[command(author, version, about = "Score a trained model on arithmetic questions", long_about = None)]
struct Cli {
    /// Directory holding config.json, vocab.json and *.safetensors
    #[arg(short, long, default_value = "checkpoints")]
    checkpoint_dir: PathBuf,

    /// Question file of `<prompt>ANS<answer>` records separated by "\nEND"
    #[arg(short, long, default_value = "data/test_questions")]
    questions: PathBuf,

    #[arg(long, default_value_t = 1337)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let device = Device::cuda_if_available();
    info!("Using device: {:?}", device);
    tch::manual_seed(cli.seed as i64);

    let loaded = load_model(&cli.checkpoint_dir, device)
        .with_context(|| format!("Failed to load model from {:?}", cli.checkpoint_dir))?;

    let text = std::fs::read_to_string(&cli.questions)
        .with_context(|| format!("Failed to read {:?}", cli.questions))?;
    let records = parse_records(&text)?;
    info!("Scoring {} records", records.len());

    let evaluator = Evaluator::new(Generator::new(&loaded.model, &loaded.vocab));
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let report = evaluator.run(&records, &mut rng)?;

    let answered = report.outcomes.iter().filter(|o| o.produced.is_some()).count();
    info!(
        "Final model score: {} ({} of {} records answered)",
        report.score,
        answered,
        report.outcomes.len()
    );

    Ok(())
}
