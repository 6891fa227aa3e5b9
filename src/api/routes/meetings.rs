//! Meeting record endpoints.

use crate::api::error::{ApiError, ApiResult};
use crate::app::AppContext;
use crate::db::{self, MeetingRepository};
use anyhow::anyhow;
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub fn router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/meeting", post(create_meeting))
        .route("/meeting/:id", get(get_meeting))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateMeetingRequest {
    title: Option<String>,
    description: Option<String>,
    duration_minutes: Option<i64>,
}

async fn create_meeting(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<CreateMeetingRequest>,
) -> ApiResult<Json<Value>> {
    let db_path = context.db_path.clone();
    let id = tokio::task::spawn_blocking(move || {
        let conn = db::open(&db_path)?;
        MeetingRepository::insert(
            &conn,
            request.title.as_deref(),
            request.description.as_deref(),
            request.duration_minutes,
        )
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow!("Meeting task failed: {}", e)))??;

    info!("Created meeting {}", id);
    Ok(Json(json!({ "id": id })))
}

async fn get_meeting(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let db_path = context.db_path.clone();
    let lookup_id = id.clone();
    let meeting = tokio::task::spawn_blocking(move || {
        let conn = db::open(&db_path)?;
        MeetingRepository::get(&conn, &lookup_id)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow!("Meeting task failed: {}", e)))??
    .ok_or(ApiError::UnknownMeeting)?;

    Ok(Json(json!({
        "id": meeting.id,
        "title": meeting.title,
        "description": meeting.description,
        "status": meeting.status.as_str(),
        "duration_minutes": meeting.duration_minutes,
        "created_at": meeting.created_at,
    })))
}
