use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tokenizer::Vocab;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a character vocabulary from a corpus
    Build {
        /// Corpus to collect characters from
        corpus: PathBuf,

        /// Where to write vocab.json
        #[arg(short, long, default_value = "data/vocab.json")]
        output: PathBuf,
    },
    /// Encode text using an existing vocabulary
    Encode {
        /// Path to vocab.json
        #[arg(long)]
        vocab: PathBuf,

        /// Text to encode
        #[arg(short, long)]
        text: String,
    },
    /// Decode ids using an existing vocabulary
    Decode {
        /// Path to vocab.json
        #[arg(long)]
        vocab: PathBuf,

        /// IDs to decode (comma separated)
        #[arg(short, long)]
        ids: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { corpus, output } => {
            let text = fs::read_to_string(&corpus)
                .with_context(|| format!("Failed to read {:?}", corpus))?;
            let vocab = Vocab::from_text(&text);
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }
            vocab.save(&output).context("Failed to save vocab")?;
            println!("Saved {} symbols to {:?}: {:?}", vocab.len(), output, vocab.alphabet());
        }
        Commands::Encode { vocab, text } => {
            let vocab = Vocab::load(vocab).context("Failed to load vocabulary")?;
            let ids = vocab.encode(&text)?;
            println!("Encoded IDs: {:?}", ids);
        }
        Commands::Decode { vocab, ids } => {
            let vocab = Vocab::load(vocab).context("Failed to load vocabulary")?;
            let id_list = ids
                .split(',')
                .map(|s| s.trim().parse::<u32>().with_context(|| format!("Invalid ID {:?}", s)))
                .collect::<Result<Vec<_>>>()?;
            let text = vocab.decode(&id_list)?;
            println!("Decoded text: {:?}", text);
        }
    }

    Ok(())
}
