//! # pdfqa CLI
//!
//! Ask questions about a PDF or a directory of PDFs.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfqa index <path>` | Build the collection and report what was indexed |
//! | `pdfqa ask <path> "<question>"` | Build, then answer one question |
//! | `pdfqa chat <path>` | Build, then answer one question per stdin line |
//!
//! ## Examples
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! pdfqa ask ./papers "What dataset was used for evaluation?"
//! pdfqa --config ./pdfqa.toml chat ./manual.pdf
//! RUST_LOG=pdfqa=debug pdfqa index ./papers
//! ```
//!
//! Answers and sources go to stdout; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use pdfqa::config::{load_config, Config};
use pdfqa::models::Answer;
use pdfqa::pipeline::RagPipeline;

/// Question answering over PDF documents.
#[derive(Parser)]
#[command(name = "pdfqa", version, about = "Question answering over PDF documents")]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a document or directory and exit.
    Index {
        /// A document file, or a directory scanned (non-recursively) for documents.
        path: PathBuf,
    },

    /// Index, then answer a single question.
    Ask {
        path: PathBuf,
        question: String,
    },

    /// Index, then answer questions read line by line from stdin.
    ///
    /// Empty lines are skipped. A failed question is reported and the
    /// session continues.
    Chat { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "pdfqa=debug" } else { "pdfqa=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Index { path } => {
            let pipeline = RagPipeline::from_config(config).await?;
            let index = pipeline.initialize(&path).await?;
            println!(
                "Indexed {} chunks into collection '{}' ({})",
                index.len(),
                index.collection(),
                index.embedder()
            );
        }
        Commands::Ask { path, question } => {
            let pipeline = ready_pipeline(config, &path).await?;
            let answer = pipeline.answer(&question).await?;
            print_answer(&answer);
        }
        Commands::Chat { path } => {
            let pipeline = ready_pipeline(config, &path).await?;
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                let question = line.trim();
                if question.is_empty() {
                    continue;
                }
                match pipeline.answer(question).await {
                    Ok(answer) => print_answer(&answer),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
        }
    }

    Ok(())
}

async fn ready_pipeline(config: Config, path: &Path) -> Result<RagPipeline> {
    let pipeline = RagPipeline::from_config(config).await?;
    pipeline.initialize(path).await?;
    Ok(pipeline)
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if answer.supporting_chunks.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for chunk in &answer.supporting_chunks {
        println!("  {} (page {})", chunk.source_path, chunk.page_index + 1);
    }
}
