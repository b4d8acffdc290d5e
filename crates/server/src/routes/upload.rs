use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{error::AppError, state::AppState};

const INVALID_LINK: &str = "Invalid or expired session";

/// Landing page for a scanned upload link. A live session or an existing
/// user id is accepted; the body tells the sender how to push files to it.
pub async fn upload_link(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Result<Json<Value>, AppError> {
    let link = format!(
        "{}/upload/{}",
        state.config.server.public_url.trim_end_matches('/'),
        target
    );
    let send_hint = format!("dropsync send {} <files>...", link);

    if let Some(session) = state.db.get_session(&target).await? {
        let session: shared::Session = session.into();
        if !session.is_valid_at(Utc::now()) {
            tracing::debug!("Expired session {} scanned", session.id);
            return Err(AppError::NotFound(INVALID_LINK.to_string()));
        }
        return Ok(Json(json!({
            "kind": "session",
            "target": session.id,
            "expires_at": session.expires_at,
            "upload_url": link,
            "send": send_hint,
        })));
    }

    if state.db.get_user_by_id(&target).await?.is_some() {
        return Ok(Json(json!({
            "kind": "inbox",
            "target": target,
            "upload_url": link,
            "send": format!("dropsync send --to-user {} <files>...", link),
        })));
    }

    Err(AppError::NotFound(INVALID_LINK.to_string()))
}
