//! Flat per-meeting similarity index.
//!
//! One JSON file per meeting under the indices directory, holding
//! (embedding, passage) pairs. Lookup is brute-force cosine similarity, which
//! is plenty for a handful of uploaded documents per meeting. The file is
//! deleted when the meeting ends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{chunk_text, ContextRetriever, Embedder, RetrievalError};

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    embedding: Vec<f32>,
    passage: String,
}

pub struct VectorIndex {
    dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl VectorIndex {
    pub fn new(
        dir: PathBuf,
        embedder: Arc<dyn Embedder>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            dir,
            embedder,
            chunk_size,
            chunk_overlap,
        }
    }

    fn index_path(&self, scope: &str) -> PathBuf {
        self.dir.join(format!("{}.json", scope))
    }

    fn load(&self, path: &Path) -> Result<Vec<IndexEntry>, RetrievalError> {
        if !path.exists() {
            return Err(RetrievalError::IndexNotReady);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn store(&self, path: &Path, entries: &[IndexEntry]) -> Result<(), RetrievalError> {
        std::fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string(entries)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Chunk, embed, and append a document's text to a meeting's index.
    pub async fn index_document(&self, scope: &str, text: &str) -> Result<usize, RetrievalError> {
        let chunks = chunk_text(text, self.chunk_size, self.chunk_overlap);
        if chunks.is_empty() {
            return Ok(0);
        }

        let path = self.index_path(scope);
        let mut entries = match self.load(&path) {
            Ok(entries) => entries,
            Err(RetrievalError::IndexNotReady) => Vec::new(),
            Err(e) => return Err(e),
        };

        let added = chunks.len();
        for chunk in chunks {
            let embedding = self.embedder.embed(&chunk).await?;
            entries.push(IndexEntry {
                embedding,
                passage: chunk,
            });
        }

        self.store(&path, &entries)?;
        info!(
            "Indexed {} passages for meeting {} ({} total)",
            added,
            scope,
            entries.len()
        );
        Ok(added)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl ContextRetriever for VectorIndex {
    async fn query(
        &self,
        scope: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<String>, RetrievalError> {
        let entries = self.load(&self.index_path(scope))?;
        if entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(text).await?;

        let mut scored: Vec<(f32, &IndexEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query_embedding, &e.embedding), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let passages: Vec<String> = scored
            .into_iter()
            .take(k)
            .map(|(_, e)| e.passage.clone())
            .collect();

        debug!(
            "Retrieved {} passages for meeting {} query ({} chars)",
            passages.len(),
            scope,
            text.len()
        );
        Ok(passages)
    }

    async fn drop_scope(&self, scope: &str) -> Result<(), RetrievalError> {
        let path = self.index_path(scope);
        if path.exists() {
            std::fs::remove_file(&path)?;
            info!("Deleted index for meeting {}", scope);
        }
        Ok(())
    }
}
