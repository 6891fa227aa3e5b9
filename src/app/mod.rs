//! Service wiring.
//!
//! Builds the dependency-injected application context (registry, gateways,
//! retriever) once at process start and hands it to the API server. There is
//! no ambient module-level state; everything sessions share flows through
//! [`AppContext`].

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::api::ApiServer;
use crate::config::Config;
use crate::retrieval::{OpenAiEmbedder, VectorIndex};
use crate::session::{MeetingRegistry, SessionDeps};
use crate::synthesis::OpenAiSynthesizer;
use crate::transcription::OpenAiTranscriber;

/// Everything the HTTP and WebSocket layers need, constructed at startup and
/// torn down at shutdown.
pub struct AppContext {
    pub config: Config,
    pub session: Arc<SessionDeps>,
    /// Concrete index handle for ingestion; sessions see it as a
    /// `ContextRetriever` through [`SessionDeps`].
    pub index: Arc<VectorIndex>,
    pub documents_dir: PathBuf,
    pub db_path: PathBuf,
}

pub async fn run_service() -> Result<()> {
    info!("Starting IdeaStream service");

    let config = Config::load()?;
    let context = build_context(config)?;

    // Make sure the schema exists before the first request
    crate::db::init_db()?;

    let api_server = ApiServer::new(Arc::new(context));
    api_server.start().await
}

pub fn build_context(config: Config) -> Result<AppContext> {
    let transcriber = Arc::new(OpenAiTranscriber::new(&config.openai)?);
    let synthesizer = Arc::new(OpenAiSynthesizer::new(&config.openai)?);
    let embedder = Arc::new(OpenAiEmbedder::new(&config.openai)?);

    let index = Arc::new(VectorIndex::new(
        crate::global::indices_dir()?,
        embedder,
        config.retrieval.chunk_size,
        config.retrieval.chunk_overlap,
    ));

    let session = Arc::new(SessionDeps {
        registry: MeetingRegistry::new(),
        transcriber,
        synthesizer,
        retriever: index.clone(),
        recordings_dir: crate::global::recordings_dir()?,
        db_path: crate::global::db_file()?,
        top_k: config.retrieval.top_k,
    });

    Ok(AppContext {
        config,
        session,
        index,
        documents_dir: crate::global::documents_dir()?,
        db_path: crate::global::db_file()?,
    })
}
