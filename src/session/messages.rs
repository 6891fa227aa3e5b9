//! Wire messages exchanged over a meeting WebSocket.
//!
//! Inbound messages are JSON objects tagged by `type`; field names follow the
//! client contract (`meetingId`, `data`). Outbound payloads are built here so
//! every broadcast site produces the same shapes.

use serde::Deserialize;
use serde_json::{json, Value};

/// A message received from a connected client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One base64-encoded audio clip to transcribe and fan out.
    Audio {
        #[serde(rename = "meetingId")]
        meeting_id: String,
        data: String,
    },
    /// Request an end-of-meeting summary without ending the meeting.
    GenerateSummary {
        #[serde(rename = "meetingId")]
        meeting_id: String,
    },
    /// Finalize the meeting and close out the session.
    EndMeeting {
        #[serde(rename = "meetingId")]
        meeting_id: String,
    },
}

pub fn transcription(text: &str, user: &str) -> Value {
    json!({
        "status": "success",
        "type": "transcription",
        "text": text,
        "user": user,
    })
}

pub fn analysis(output: Value) -> Value {
    json!({
        "status": "success",
        "type": "analysis",
        "output": output,
    })
}

pub fn summary(output: Value) -> Value {
    json!({
        "status": "success",
        "type": "summary",
        "output": output,
    })
}

pub fn end_meeting(message: &str) -> Value {
    json!({
        "status": "success",
        "type": "end_meeting",
        "message": message,
    })
}

/// Error payload sent to the originating sender only.
pub fn error(message: &str) -> Value {
    json!({ "error": message })
}
