use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use shared::{
    DeleteFilesRequest, DeleteFilesResponse, FileFilter, FileRecord, NewFileRecord,
    UpdateFilesRequest,
};

use super::auth::AuthUser;
use crate::{error::AppError, state::AppState};

/// Record an uploaded file and announce it to realtime subscribers
pub async fn insert_file(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<NewFileRecord>,
) -> Result<(StatusCode, Json<FileRecord>), AppError> {
    if req.user_id != auth.user_id {
        return Err(AppError::Forbidden(
            "Files can only be recorded for the signed-in user".to_string(),
        ));
    }
    if req.receiver_id.is_empty() {
        return Err(AppError::BadRequest("receiver_id is required".to_string()));
    }

    let record: FileRecord = state.db.insert_file(&req).await?.into();
    tracing::info!(
        "File {} ({} bytes) sent by {} to {}",
        record.name,
        record.size,
        record.user_id,
        record.receiver_id
    );

    state.realtime.publish_insert(&record);

    Ok((StatusCode::CREATED, Json(record)))
}

/// User-scoped selectors must name the caller; sessions have no owner
fn ensure_own_selectors(filter: &FileFilter, user_id: &str) -> Result<(), AppError> {
    let selectors = [
        ("involving", &filter.involving),
        ("user_id", &filter.user_id),
        ("receiver_id", &filter.receiver_id),
    ];
    for (column, value) in selectors {
        if let Some(value) = value {
            if value != user_id {
                return Err(AppError::Forbidden(format!(
                    "{} may only select the signed-in user",
                    column
                )));
            }
        }
    }
    Ok(())
}

pub async fn query_files(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<FileFilter>,
) -> Result<Json<Vec<FileRecord>>, AppError> {
    let unscoped = filter.involving.is_none()
        && filter.user_id.is_none()
        && filter.receiver_id.is_none()
        && filter.session_id.is_none();
    if unscoped {
        return Err(AppError::BadRequest(
            "At least one of involving, user_id, receiver_id or session_id is required".to_string(),
        ));
    }

    ensure_own_selectors(&filter, &auth.user_id)?;

    let files = state.db.query_files(&filter).await?;
    Ok(Json(files.into_iter().map(Into::into).collect()))
}

/// Patch rows the caller uploaded or received; other ids are ignored
pub async fn update_files(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateFilesRequest>,
) -> Result<Json<Vec<FileRecord>>, AppError> {
    if req.patch.is_empty() {
        return Err(AppError::BadRequest("Empty patch".to_string()));
    }

    let files = state
        .db
        .update_files(&req.ids, &req.patch, &auth.user_id)
        .await?;
    tracing::debug!("{} updated {} of {} files", auth.user_id, files.len(), req.ids.len());

    Ok(Json(files.into_iter().map(Into::into).collect()))
}

pub async fn delete_files(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<DeleteFilesRequest>,
) -> Result<Json<DeleteFilesResponse>, AppError> {
    if req.owner != auth.user_id {
        return Err(AppError::Forbidden(
            "Only the uploader can delete a file".to_string(),
        ));
    }

    let deleted = state.db.delete_files(&req.ids, &req.owner).await?;
    tracing::info!("{} deleted {} files", auth.user_id, deleted);

    Ok(Json(DeleteFilesResponse { deleted }))
}
