//! User registration and token issuance.

use crate::api::error::{ApiError, ApiResult};
use crate::app::AppContext;
use crate::db::{self, TokenRepository, UserRepository};
use anyhow::anyhow;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub fn router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

#[derive(Debug, Deserialize)]
struct SignupRequest {
    email: String,
    first_name: String,
    last_name: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn signup(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if request.email.is_empty() || request.password.is_empty() {
        return Err(ApiError::rejected("Email and password are required"));
    }

    let db_path = context.db_path.clone();
    let email = request.email.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db::open(&db_path)?;
        UserRepository::create(
            &conn,
            &request.email,
            &request.first_name,
            &request.last_name,
            &request.password,
        )
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow!("Signup task failed: {}", e)))?
    .map_err(|e| ApiError::rejected(e.to_string()))?;

    info!("Registered user {}", email);

    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "User registered successfully!"})),
    ))
}

async fn login(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<Value>> {
    let db_path = context.db_path.clone();
    let expire_minutes = context.config.auth.token_expire_minutes;

    let token = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<String>> {
        let conn = db::open(&db_path)?;
        let Some(user) =
            UserRepository::authenticate(&conn, &request.email, &request.password)?
        else {
            return Ok(None);
        };
        Ok(Some(TokenRepository::issue(&conn, user.id, expire_minutes)?))
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow!("Login task failed: {}", e)))??
    .ok_or_else(|| ApiError::unauthenticated("Invalid email or password"))?;

    Ok(Json(json!({
        "access_token": token,
        "token_type": "bearer",
    })))
}
