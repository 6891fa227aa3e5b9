use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ideastream::{app, config::Config, global, retrieval::{OpenAiEmbedder, VectorIndex}};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ideastream", about = "Real-time meeting transcription backend")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Print version information
    Version,
    /// Index a document into a meeting's context index
    Index {
        /// Meeting to attach the document to
        meeting_id: String,
        /// Path to a plain-text document
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("IdeaStream {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Index { meeting_id, file }) => index_document(&meeting_id, &file).await,
        None => app::run_service().await,
    }
}

/// Offline ingestion: chunk, embed, and append a document to a meeting's
/// index without going through the upload endpoint.
async fn index_document(meeting_id: &str, file: &PathBuf) -> Result<()> {
    let config = Config::load()?;
    let embedder = Arc::new(OpenAiEmbedder::new(&config.openai)?);
    let index = VectorIndex::new(
        global::indices_dir()?,
        embedder,
        config.retrieval.chunk_size,
        config.retrieval.chunk_overlap,
    );

    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read document {:?}", file))?;
    let added = index.index_document(meeting_id, &text).await?;

    println!("Indexed {} passages for meeting {}", added, meeting_id);
    Ok(())
}
