use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{
    analysis_prompt, parse_artifact, summary_prompt, ArtifactResult, MeetingSummary,
    PeriodicAnalysis, SynthesisError, SynthesisGateway,
};
use crate::config::OpenAiConfig;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Chat-completion synthesis via the OpenAI API.
pub struct OpenAiSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiSynthesizer {
    pub fn new(config: &OpenAiConfig) -> anyhow::Result<Self> {
        let api_key = config.resolve_api_key()?;
        let endpoint = format!("{}/chat/completions", config.api_base);

        info!(
            "Initialized OpenAI synthesizer (model: {})",
            config.chat_model
        );

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model: config.chat_model.clone(),
        })
    }

    /// One completion call; returns the raw assistant text.
    async fn complete(&self, user_prompt: String) -> Result<String, SynthesisError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a helpful assistant.".to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("Chat completion failed with status {}: {}", status, body);
            return Err(SynthesisError::Service(format!("status {}", status)));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| SynthesisError::Service(format!("unparsable response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SynthesisError::Service("response had no choices".to_string()))?;

        debug!("Chat completion returned {} chars", content.len());
        Ok(content)
    }
}

#[async_trait::async_trait]
impl SynthesisGateway for OpenAiSynthesizer {
    async fn analyze(
        &self,
        transcript: &str,
        context: &str,
    ) -> Result<ArtifactResult<PeriodicAnalysis>, SynthesisError> {
        let raw = self.complete(analysis_prompt(transcript, context)).await?;
        Ok(parse_artifact(&raw))
    }

    async fn summarize(
        &self,
        transcript: &str,
        context: &str,
    ) -> Result<ArtifactResult<MeetingSummary>, SynthesisError> {
        let raw = self.complete(summary_prompt(transcript, context)).await?;
        Ok(parse_artifact(&raw))
    }
}
