use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::{NewSession, Session};

use super::auth::AuthUser;
use crate::{error::AppError, state::AppState};

pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<NewSession>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    if req.id.is_empty() || !req.id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest(format!("Invalid session id: {:?}", req.id)));
    }

    let session = state
        .db
        .create_session(&req)
        .await?
        .ok_or_else(|| AppError::Conflict(format!("Session {} already exists", req.id)))?;

    tracing::info!(
        "Session {} created by {} (expires {})",
        session.id,
        auth.user_id,
        session.expires_at
    );

    Ok((StatusCode::CREATED, Json(session.into())))
}

/// Anyone holding a session link may look it up
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, AppError> {
    let session = state
        .db
        .get_session(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))?;

    Ok(Json(session.into()))
}
