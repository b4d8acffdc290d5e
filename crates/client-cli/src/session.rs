//! Receive sessions: creation, the link senders open, and validity checks.

use chrono::{DateTime, Utc};
use rand::Rng;
use shared::{NewSession, Session, SESSION_ID_LEN};

use crate::backend::Backend;
use crate::error::{ClientError, Result};

const SESSION_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Path segment under which upload links live
const UPLOAD_SEGMENT: &str = "upload";

/// A created session and the link senders use to reach it
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLink {
    pub session: Session,
    pub upload_url: String,
}

pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    (0..SESSION_ID_LEN)
        .map(|_| SESSION_ID_CHARSET[rng.gen_range(0..SESSION_ID_CHARSET.len())] as char)
        .collect()
}

/// `<origin>/upload/<target>`
pub fn upload_url(origin: &str, target: &str) -> String {
    format!("{}/{}/{}", origin.trim_end_matches('/'), UPLOAD_SEGMENT, target)
}

/// Accept either a bare id or an upload link and return the id
pub fn parse_target(input: &str) -> Option<String> {
    let input = input.trim();
    let marker = format!("/{}/", UPLOAD_SEGMENT);
    let id = match input.rsplit_once(marker.as_str()) {
        Some((_, rest)) => rest.split(['/', '?', '#']).next().unwrap_or(rest),
        None if input.contains("://") => return None,
        None => input,
    };
    (!id.is_empty()).then(|| id.to_string())
}

pub async fn create_session(backend: &dyn Backend, origin: &str) -> Result<SessionLink> {
    create_session_at(backend, origin, Utc::now()).await
}

/// Persist a new session that stays open for a day from `now`.
pub async fn create_session_at(
    backend: &dyn Backend,
    origin: &str,
    now: DateTime<Utc>,
) -> Result<SessionLink> {
    let new_session = NewSession::starting_at(generate_session_id(), now);
    let session = backend.insert_session(&new_session).await.map_err(|e| {
        tracing::error!("Error creating session: {}", e);
        ClientError::from(e)
    })?;

    tracing::info!("Created session {} (expires {})", session.id, session.expires_at);
    let upload_url = upload_url(origin, &session.id);
    Ok(SessionLink {
        session,
        upload_url,
    })
}

pub async fn validate_session(backend: &dyn Backend, id: &str) -> bool {
    validate_session_at(backend, id, Utc::now()).await
}

/// Whether session `id` exists and has not expired at `now`.
///
/// A failed lookup counts as invalid.
pub async fn validate_session_at(backend: &dyn Backend, id: &str, now: DateTime<Utc>) -> bool {
    match backend.get_session(id).await {
        Ok(Some(session)) => session.is_valid_at(now),
        Ok(None) => false,
        Err(e) => {
            tracing::error!("Error validating session {}: {}", id, e);
            false
        }
    }
}

pub async fn require_valid_session(backend: &dyn Backend, id: &str) -> Result<()> {
    if validate_session(backend, id).await {
        Ok(())
    } else {
        Err(ClientError::SessionInvalid(id.to_string()))
    }
}
