//! The live transcription WebSocket.
//!
//! `GET /ws/audio?meeting_id=…&token=…` upgrades into a session coordinator.
//! Identity and meeting resolution happen before the session joins; a failed
//! resolution closes the socket with a policy-violation frame instead of
//! registering anything.

use crate::app::AppContext;
use crate::db::{self, MeetingRepository, MeetingStatus, TokenRepository};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::session::{Flow, SessionCoordinator};

pub fn router() -> Router<Arc<AppContext>> {
    Router::new().route("/audio", get(audio_ws))
}

#[derive(Debug, Deserialize)]
struct AudioQuery {
    meeting_id: String,
    token: String,
}

/// Resolve the joining client before accepting any frames. Returns the
/// participant label, or the rejection reason.
fn resolve_join(db_path: &PathBuf, token: &str, meeting_id: &str) -> Result<String, &'static str> {
    let Ok(conn) = db::open(db_path) else {
        return Err("Service unavailable");
    };

    let user = match TokenRepository::resolve(&conn, token) {
        Ok(Some(user)) => user,
        _ => return Err("Could not validate credentials"),
    };

    match MeetingRepository::get(&conn, meeting_id) {
        Ok(Some(meeting)) if meeting.status != MeetingStatus::Finished => {}
        _ => return Err("Meeting not found"),
    }

    let _ = MeetingRepository::add_participant(&conn, meeting_id, user.id);
    Ok(user.display_name())
}

async fn audio_ws(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<AudioQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let db_path = context.db_path.clone();
    let token = query.token.clone();
    let meeting_id = query.meeting_id.clone();
    let resolution =
        tokio::task::spawn_blocking(move || resolve_join(&db_path, &token, &meeting_id))
            .await
            .unwrap_or(Err("Service unavailable"));

    match resolution {
        Ok(label) => ws.on_upgrade(move |socket| {
            run_session(socket, context, query.meeting_id, label)
        }),
        Err(reason) => {
            warn!(
                "Rejected WebSocket join for meeting {}: {}",
                query.meeting_id, reason
            );
            ws.on_upgrade(move |socket| reject(socket, reason))
        }
    }
}

async fn reject(mut socket: WebSocket, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: reason.into(),
        })))
        .await;
}

/// Drive one session: a writer task drains the participant channel into the
/// socket while this task feeds inbound frames to the coordinator.
/// Deregistration runs on every exit path.
async fn run_session(
    socket: WebSocket,
    context: Arc<AppContext>,
    meeting_id: String,
    label: String,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let mut session =
        SessionCoordinator::join(context.session.clone(), meeting_id, label, tx).await;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if session.handle_frame(&text).await == Flow::Finalize {
                    session.finalize().await;
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!("Session {}: client closed connection", session.channel_id());
                break;
            }
            Ok(_) => {
                // Ping/pong handled by axum; binary frames are not part of
                // the protocol
                debug!("Session {}: ignoring non-text frame", session.channel_id());
            }
            Err(e) => {
                warn!("Session {}: channel error: {}", session.channel_id(), e);
                break;
            }
        }
    }

    session.terminate().await;
    // The coordinator holds the last sender clone once terminate has pulled
    // the member out of the registry; dropping it closes the channel so the
    // writer drains everything queued (including the end_meeting ack) and
    // exits on its own.
    drop(session);
    let _ = writer.await;
}
