use reqwest::multipart;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::{debug, error, info};

use super::{TranscriptionError, TranscriptionGateway};
use crate::config::OpenAiConfig;

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    r#type: Option<String>,
    code: Option<String>,
}

/// Whisper transcription via the OpenAI translations endpoint.
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiTranscriber {
    pub fn new(config: &OpenAiConfig) -> anyhow::Result<Self> {
        let api_key = config.resolve_api_key()?;
        let endpoint = format!("{}/audio/translations", config.api_base);

        info!("Initialized OpenAI transcriber with endpoint: {}", endpoint);

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model: config.transcription_model.clone(),
        })
    }
}

#[async_trait::async_trait]
impl TranscriptionGateway for OpenAiTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError> {
        debug!("Transcribing audio clip: {:?}", audio_path);

        let bytes = fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .part(
                "file",
                multipart::Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str("audio/wav")
                    .map_err(TranscriptionError::Request)?,
            );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!(
                "Transcription request failed with status {}: {}",
                status, response_text
            );

            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&response_text) {
                return Err(TranscriptionError::Service(format!(
                    "{} (type: {:?}, code: {:?})",
                    err.error.message, err.error.r#type, err.error.code
                )));
            }

            return Err(TranscriptionError::Service(format!(
                "status {}: {}",
                status, response_text
            )));
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&response_text)
            .map_err(|e| TranscriptionError::Service(format!("unparsable response: {}", e)))?;

        let text = parsed.text.trim().to_string();
        if text.is_empty() {
            return Err(TranscriptionError::Empty);
        }

        debug!("Transcription complete: {} chars", text.len());
        Ok(text)
    }
}
