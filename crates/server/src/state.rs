use crate::{config::Config, db::Database, realtime::RealtimeHub, storage::ObjectStorage};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub storage: ObjectStorage,
    pub realtime: Arc<RealtimeHub>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        let storage = ObjectStorage::new(&config.storage.root, config.server.public_url.clone());

        Self {
            db,
            config,
            storage,
            realtime: Arc::new(RealtimeHub::new()),
        }
    }
}
