//! Document upload and background indexing.
//!
//! Accepts a multipart form with a text document and a meeting id, marks the
//! meeting in progress, records the uploader as a participant, saves the file,
//! and schedules chunk/embed/index work in the background so the request
//! returns immediately.

use crate::api::error::{ApiError, ApiResult};
use crate::app::AppContext;
use crate::db::{self, MeetingRepository, MeetingStatus, TokenRepository, UserRecord};
use anyhow::anyhow;
use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use chrono::Local;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

pub fn router() -> Router<Arc<AppContext>> {
    Router::new().route("/upload", post(upload))
}

/// Resolve the bearer token from the Authorization header to a user.
pub async fn authenticate(
    context: &AppContext,
    headers: &HeaderMap,
) -> Result<UserRecord, ApiError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthenticated("Missing bearer token"))?
        .to_string();

    let db_path = context.db_path.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db::open(&db_path)?;
        TokenRepository::resolve(&conn, &token)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow!("Auth task failed: {}", e)))??
    .ok_or_else(|| ApiError::unauthenticated("Could not validate credentials"))
}

fn is_supported(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "txt" | "md"))
}

async fn upload(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let user = authenticate(&context, &headers).await?;

    let mut file_name: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut meeting_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::rejected(format!("Malformed multipart body: {}", e)))?
    {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("file") => {
                file_name = field.file_name().map(|n| n.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::rejected(format!("Failed to read file: {}", e)))?;
                file_bytes = Some(bytes.to_vec());
            }
            Some("meeting_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::rejected(format!("Failed to read field: {}", e)))?;
                meeting_id = Some(value);
            }
            _ => {}
        }
    }

    let file_name = file_name.ok_or_else(|| ApiError::rejected("Missing file"))?;
    let file_bytes = file_bytes.ok_or_else(|| ApiError::rejected("Missing file"))?;
    let meeting_id = meeting_id.ok_or_else(|| ApiError::rejected("Missing meeting_id"))?;

    if !is_supported(&file_name) {
        return Err(ApiError::rejected(
            "Only plain-text documents (.txt, .md) are accepted",
        ));
    }

    let text = String::from_utf8(file_bytes)
        .map_err(|_| ApiError::rejected("Document is not valid UTF-8 text"))?;

    mark_in_progress(&context, &meeting_id, user.id).await?;

    // Keep a copy of the raw upload alongside the index
    let saved_name = format!("{}_{}", Local::now().format("%Y%m%d%H%M%S"), file_name);
    let saved_path = context.documents_dir.join(&saved_name);
    std::fs::create_dir_all(&context.documents_dir)
        .and_then(|_| std::fs::write(&saved_path, &text))
        .map_err(|e| ApiError::Internal(anyhow!("Failed to save document: {}", e)))?;

    info!(
        "Saved document {:?} for meeting {} (uploader: {})",
        saved_path, meeting_id, user.email
    );

    // Chunking and embedding happen in the background
    let index = context.index.clone();
    let scope = meeting_id.clone();
    tokio::spawn(async move {
        match index.index_document(&scope, &text).await {
            Ok(added) => info!("Background indexing added {} passages for {}", added, scope),
            Err(e) => error!("Background indexing failed for {}: {}", scope, e),
        }
    });

    Ok(Json(json!({
        "message": format!(
            "File {} saved successfully. Processing will continue in the background.",
            file_name
        )
    })))
}

async fn mark_in_progress(
    context: &AppContext,
    meeting_id: &str,
    user_id: i64,
) -> Result<(), ApiError> {
    let db_path = context.db_path.clone();
    let meeting_id = meeting_id.to_string();

    let found = tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
        let conn = db::open(&db_path)?;
        let Some(meeting) = MeetingRepository::get(&conn, &meeting_id)? else {
            return Ok(false);
        };
        if meeting.status != MeetingStatus::InProgress {
            MeetingRepository::set_status(&conn, &meeting_id, MeetingStatus::InProgress)?;
        }
        MeetingRepository::add_participant(&conn, &meeting_id, user_id)?;
        Ok(true)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow!("Upload task failed: {}", e)))??;

    if !found {
        return Err(ApiError::UnknownMeeting);
    }
    Ok(())
}
