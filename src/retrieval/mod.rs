//! Document context retrieval.
//!
//! Uploaded documents are split into overlapping chunks, embedded, and stored
//! in a flat per-meeting index. At analysis time the live transcript is
//! embedded with the same function and the top-k most similar passages are
//! returned to ground the synthesis prompts.

use async_trait::async_trait;
use thiserror::Error;

mod embedder;
mod index;

pub use embedder::{Embedder, OpenAiEmbedder};
pub use index::VectorIndex;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// No documents have been indexed yet for this scope. Callers treat this
    /// the same as an empty result.
    #[error("No index available for this meeting yet")]
    IndexNotReady,
    #[error("Embedding request failed: {0}")]
    Embedding(String),
    #[error("Index I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Index file corrupted: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Return up to `k` indexed passages most similar to `text`, most similar
    /// first. `scope` is the meeting id.
    async fn query(&self, scope: &str, text: &str, k: usize)
        -> Result<Vec<String>, RetrievalError>;

    /// Delete the persisted index for a scope, if any. Idempotent.
    async fn drop_scope(&self, scope: &str) -> Result<(), RetrievalError>;
}

/// Split text into chunks of roughly `chunk_size` bytes with `chunk_overlap`
/// bytes of overlap, preferring paragraph, then line, then word boundaries.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let hard_end = prev_boundary(text, (start + chunk_size).min(text.len()));
        let end = if hard_end == text.len() {
            hard_end
        } else {
            // Only accept a break beyond the overlap region so the next
            // window always advances
            find_break(&text[start..hard_end], chunk_overlap).map_or(hard_end, |b| start + b)
        };

        let chunk = text[start..end].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end == text.len() {
            break;
        }
        let next = prev_boundary(text, end.saturating_sub(chunk_overlap));
        start = next.max(next_boundary(text, start + 1));
    }

    chunks
}

/// Best split point within a window: last paragraph break, else last newline,
/// else last space, each accepted only past `min_pos`. Returns a byte offset
/// into the window.
fn find_break(window: &str, min_pos: usize) -> Option<usize> {
    for sep in ["\n\n", "\n", " "] {
        if let Some(pos) = window.rfind(sep) {
            if pos > min_pos {
                return Some(pos);
            }
        }
    }
    None
}

fn prev_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn next_boundary(text: &str, mut i: usize) -> usize {
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i.min(text.len())
}
