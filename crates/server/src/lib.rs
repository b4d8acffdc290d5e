//! DropSync backend service: anonymous auth, the `sessions` and `files`
//! tables, bucketed object storage and a realtime change feed.

pub mod config;
pub mod db;
pub mod error;
pub mod realtime;
pub mod routes;
pub mod state;
pub mod storage;

use tokio::net::TcpListener;

pub use state::AppState;

/// Serve the API on an already bound listener
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = routes::create_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}
