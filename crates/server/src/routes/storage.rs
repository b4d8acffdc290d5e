use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use shared::{RemoveObjectsRequest, StoredObject};

use super::auth::AuthUser;
use crate::{error::AppError, state::AppState, storage::ObjectMeta};

pub const UPSERT_HEADER: &str = "x-upsert";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

fn ensure_owned_path(user_id: &str, path: &str) -> Result<(), AppError> {
    let prefix = format!("{}/", user_id);
    if !path.starts_with(&prefix) || path.len() == prefix.len() {
        return Err(AppError::Forbidden(format!(
            "Objects must live under {}",
            prefix
        )));
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn upload_object(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((bucket, path)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StoredObject>, AppError> {
    ensure_owned_path(&auth.user_id, &path)?;

    let upsert = header_str(&headers, UPSERT_HEADER)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let meta = ObjectMeta {
        cache_control: header_str(&headers, header::CACHE_CONTROL).map(str::to_string),
        content_type: header_str(&headers, header::CONTENT_TYPE).map(str::to_string),
        size: body.len() as u64,
    };

    state.storage.put(&bucket, &path, &body, meta, upsert).await?;
    tracing::debug!(
        "{} uploaded {}",
        auth.user_id,
        state.storage.public_url(&bucket, &path)
    );

    Ok(Json(StoredObject {
        full_path: format!("{}/{}", bucket, path),
        path,
    }))
}

pub async fn public_object(
    State(state): State<AppState>,
    Path((bucket, path)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let (data, meta) = state.storage.get(&bucket, &path).await?;

    let content_type = meta
        .as_ref()
        .and_then(|m| m.content_type.clone())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
    let cache_control = meta
        .and_then(|m| m.cache_control)
        .map(|secs| format!("max-age={}", secs))
        .unwrap_or_else(|| "no-cache".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, cache_control),
        ],
        data,
    ))
}

pub async fn remove_objects(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(bucket): Path<String>,
    Json(req): Json<RemoveObjectsRequest>,
) -> Result<Json<Vec<StoredObject>>, AppError> {
    for path in &req.paths {
        ensure_owned_path(&auth.user_id, path)?;
    }

    let removed = state.storage.remove(&bucket, &req.paths).await?;
    tracing::info!("{} removed {} objects from {}", auth.user_id, removed.len(), bucket);

    Ok(Json(
        removed
            .into_iter()
            .map(|path| StoredObject {
                full_path: format!("{}/{}", bucket, path),
                path,
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_path_requires_user_prefix() {
        assert!(ensure_owned_path("u1", "u1/1-a.png").is_ok());
        assert!(ensure_owned_path("u1", "u2/1-a.png").is_err());
        assert!(ensure_owned_path("u1", "u1/").is_err());
        assert!(ensure_owned_path("u1", "u10/a").is_err());
    }
}
