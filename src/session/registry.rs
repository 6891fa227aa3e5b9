//! Process-wide meeting membership and broadcast fan-out.
//!
//! Maps each meeting to the channels of its currently connected participants.
//! Membership mutation is a critical section; broadcast takes a snapshot of
//! the member list and tolerates channels that died mid-flight.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound channel for one connected participant. Messages are serialized
/// JSON; a writer task drains the receiving end into the WebSocket, so sends
/// never block on a slow socket.
pub type ParticipantSender = mpsc::UnboundedSender<String>;

/// One registered participant channel.
#[derive(Debug, Clone)]
pub struct Member {
    pub channel_id: Uuid,
    pub label: String,
    pub sender: ParticipantSender,
}

/// Thread-safe registry handle, cheap to clone and share between sessions.
#[derive(Clone, Default)]
pub struct MeetingRegistry {
    inner: Arc<Mutex<HashMap<String, Vec<Member>>>>,
}

impl MeetingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant channel under a meeting, creating the entry on
    /// first join. Duplicate adds are accepted; identity is the channel id.
    pub async fn join(&self, meeting_id: &str, member: Member) {
        let mut meetings = self.inner.lock().await;
        let members = meetings.entry(meeting_id.to_string()).or_default();
        debug!(
            "Channel {} ({}) joined meeting {} ({} members before join)",
            member.channel_id,
            member.label,
            meeting_id,
            members.len()
        );
        members.push(member);
    }

    /// Remove a participant channel. The meeting entry is deleted once its
    /// member set becomes empty.
    pub async fn leave(&self, meeting_id: &str, channel_id: Uuid) {
        let mut meetings = self.inner.lock().await;
        if let Some(members) = meetings.get_mut(meeting_id) {
            members.retain(|m| m.channel_id != channel_id);
            if members.is_empty() {
                meetings.remove(meeting_id);
                debug!("Meeting {} has no members left, removing entry", meeting_id);
            }
        }
    }

    /// Deliver a payload to every member of a meeting at call time.
    ///
    /// The member list is snapshotted under the lock and delivery happens
    /// outside it; a member whose channel has closed is skipped without
    /// aborting delivery to the rest. An unknown meeting is a no-op.
    pub async fn broadcast(&self, meeting_id: &str, payload: &Value) {
        let snapshot: Vec<Member> = {
            let meetings = self.inner.lock().await;
            match meetings.get(meeting_id) {
                Some(members) => members.clone(),
                None => return,
            }
        };

        let serialized = payload.to_string();
        for member in snapshot {
            if member.sender.send(serialized.clone()).is_err() {
                warn!(
                    "Failed to deliver to channel {} in meeting {} (disconnected), skipping",
                    member.channel_id, meeting_id
                );
            }
        }
    }

    pub async fn member_count(&self, meeting_id: &str) -> usize {
        let meetings = self.inner.lock().await;
        meetings.get(meeting_id).map_or(0, |m| m.len())
    }

    /// Whether a channel is currently registered under a meeting.
    pub async fn contains(&self, meeting_id: &str, channel_id: Uuid) -> bool {
        let meetings = self.inner.lock().await;
        meetings
            .get(meeting_id)
            .is_some_and(|members| members.iter().any(|m| m.channel_id == channel_id))
    }
}
