//! Language-model synthesis gateway.
//!
//! Builds prompts from the live transcript plus retrieved document context,
//! calls the chat-completion API once per request, and repairs the textual
//! response into a typed JSON artifact. Malformed model output never
//! propagates as a parse fault — it is coerced to an explicit error artifact
//! that still gets broadcast, so every participant learns synthesis failed.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

mod openai_chat;

pub use openai_chat::OpenAiSynthesizer;

/// The literal artifact clients receive when the model's output cannot be
/// parsed as the expected JSON shape.
pub const INVALID_JSON_ERROR: &str = "Invalid JSON format in response";

/// Periodic title/idea/category breakdown of the discussion so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicAnalysis {
    pub titles: Vec<TitleBlock>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleBlock {
    pub title: String,
    #[serde(default)]
    pub ideas: Vec<String>,
    pub category: String,
}

/// End-of-meeting structured recap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingSummary {
    #[serde(default)]
    pub key_outcomes: Vec<String>,
    #[serde(default)]
    pub decisions_made: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub important_takeaways: Vec<String>,
}

/// Tagged result of parsing a model response, instead of ad hoc string
/// slicing at call sites.
#[derive(Debug, Clone)]
pub enum ArtifactResult<T> {
    Parsed(T),
    Invalid,
}

impl<T: Serialize> ArtifactResult<T> {
    /// Collapse into the JSON value that gets broadcast.
    pub fn into_value(self) -> Value {
        match self {
            Self::Parsed(artifact) => {
                serde_json::to_value(artifact).unwrap_or_else(|_| invalid_artifact())
            }
            Self::Invalid => invalid_artifact(),
        }
    }
}

pub fn invalid_artifact() -> Value {
    json!({ "error": INVALID_JSON_ERROR })
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Synthesis request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Synthesis service error: {0}")]
    Service(String),
}

#[async_trait]
pub trait SynthesisGateway: Send + Sync {
    /// Generate a periodic analysis of the transcript so far.
    async fn analyze(
        &self,
        transcript: &str,
        context: &str,
    ) -> Result<ArtifactResult<PeriodicAnalysis>, SynthesisError>;

    /// Generate an end-of-meeting structured summary.
    async fn summarize(
        &self,
        transcript: &str,
        context: &str,
    ) -> Result<ArtifactResult<MeetingSummary>, SynthesisError>;
}

/// Strip a code-fence wrapper (``` or ```json) from a model response,
/// returning the inner text. Bare responses come back unchanged.
pub fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };

    // Drop the language tag on the opening fence line, if any
    let body = match body.split_once('\n') {
        Some((first_line, remainder)) if !first_line.trim().starts_with('{') => remainder,
        _ => body,
    };

    body.trim()
}

/// Parse a (possibly fenced) model response into an artifact.
pub fn parse_artifact<T: DeserializeOwned>(response: &str) -> ArtifactResult<T> {
    match serde_json::from_str(strip_code_fences(response)) {
        Ok(artifact) => ArtifactResult::Parsed(artifact),
        Err(_) => ArtifactResult::Invalid,
    }
}

/// Prompt for the periodic title/idea/category breakdown. The transcript is
/// the primary signal (~60%), retrieved context secondary (~40%).
pub fn analysis_prompt(transcript: &str, context: &str) -> String {
    format!(
        r#"You need to generate the titles and respective ideas, and also make sure to categorize each idea based on the following context and transcription. Weigh the transcription as the primary signal (about 60%) and the context as secondary supporting material (about 40%):
"""
Context:
{context}

Transcription:
{transcript}
"""
The result should strictly be in the following JSON format without any extra explanation, text, or comments:
{{
  "titles": [
    {{
        "title": "Title 1",
        "ideas": ["Idea 1", "Idea 2"],
        "category": "Category 1"
    }},
    {{
        "title": "Title 2",
        "ideas": ["Idea 1", "Idea 2"],
        "category": "Category 2"
    }}
  ],
  "suggestions": [
     "Suggestion 1",
     "Suggestion 2"
  ]
}}
Ensure the output is valid JSON and contains only the structure provided."#
    )
}

/// Prompt for the end-of-meeting structured summary.
pub fn summary_prompt(transcript: &str, context: &str) -> String {
    format!(
        r#"Generate a structured summary for the following context and transcription. Weigh the transcription as the primary signal (about 60%) and the context as secondary supporting material (about 40%):
"""
Context:
{context}

Transcription:
{transcript}
"""
The result should be in JSON format as shown, with no extra text:
{{
    "key_outcomes": ["Key outcome 1", "Key outcome 2"],
    "decisions_made": ["Decision 1", "Decision 2"],
    "action_items": ["Action item 1", "Action item 2"],
    "overview": "A brief overview of the meeting's main topics.",
    "important_takeaways": ["Takeaway 1", "Takeaway 2"]
}}"#
    )
}
