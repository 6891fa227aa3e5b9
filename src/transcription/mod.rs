//! Speech-to-text gateway.
//!
//! Takes a complete single-utterance clip (already conformed to mono 16-bit
//! PCM 16 kHz WAV, see [`crate::audio`]) and returns its text transcription.
//! Failures are non-fatal to the owning session.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

mod openai_api;

pub use openai_api::OpenAiTranscriber;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Failed to read audio file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Transcription request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Transcription service error: {0}")]
    Service(String),
    #[error("Transcription returned no usable text")]
    Empty,
}

#[async_trait]
pub trait TranscriptionGateway: Send + Sync {
    /// Transcribe a canonical WAV clip. An error means this chunk produced no
    /// text; the session continues.
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError>;
}
