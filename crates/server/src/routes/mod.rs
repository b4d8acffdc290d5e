use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod auth;
mod files;
mod health;
mod realtime;
mod sessions;
mod storage;
mod upload;


pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_object_bytes = state.config.storage.max_object_mb * 1024 * 1024;

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth routes
        .route("/auth/anonymous", post(auth::anonymous))
        .route("/auth/user", get(auth::current_user))
        // Table routes
        .route("/rest/sessions", post(sessions::create_session))
        .route("/rest/sessions/:id", get(sessions::get_session))
        .route(
            "/rest/files",
            post(files::insert_file)
                .get(files::query_files)
                .patch(files::update_files)
                .delete(files::delete_files),
        )
        // Object storage
        .route(
            "/storage/object/:bucket/*path",
            put(storage::upload_object).layer(DefaultBodyLimit::max(max_object_bytes)),
        )
        .route(
            "/storage/object/public/:bucket/*path",
            get(storage::public_object),
        )
        .route("/storage/object/:bucket", delete(storage::remove_objects))
        // Scanned upload links
        .route("/upload/:target", get(upload::upload_link))
        // Realtime
        .route("/realtime", get(realtime::ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
