//! Everything the client needs from the backend service: auth, the
//! `sessions`/`files` tables, object storage and realtime change feeds.

use async_trait::async_trait;
use shared::{
    ChangeEvent, ChangeFilter, FileFilter, FilePatch, FileRecord, NewFileRecord, NewSession,
    Session, User,
};
use tokio::sync::{mpsc, oneshot};

use crate::error::BackendError;

pub mod http;
#[cfg(test)]
pub mod memory;

pub use http::HttpBackend;

/// Table realtime subscriptions listen on
pub const FILES_TABLE: &str = "files";

/// Cache lifetime, in seconds, given to uploaded objects
pub const OBJECT_CACHE_CONTROL: &str = "3600";

/// How an object is written to storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectOptions {
    pub cache_control: String,
    pub content_type: Option<String>,
    /// Replace an existing object at the same path instead of failing
    pub upsert: bool,
}

impl Default for ObjectOptions {
    fn default() -> Self {
        Self {
            cache_control: OBJECT_CACHE_CONTROL.to_string(),
            content_type: None,
            upsert: false,
        }
    }
}

/// Which row changes a subscription wants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSubscription {
    pub table: String,
    pub event: ChangeEvent,
    pub filter: ChangeFilter,
}

impl ChangeSubscription {
    pub fn file_inserts(filter: ChangeFilter) -> Self {
        Self {
            table: FILES_TABLE.to_string(),
            event: ChangeEvent::Insert,
            filter,
        }
    }
}

/// Live realtime subscription.
///
/// Records arrive through a bounded channel. Dropping the handle (or calling
/// [`Subscription::unsubscribe`]) releases the subscription on the backend.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    events: mpsc::Receiver<FileRecord>,
    release: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn new(
        channel: impl Into<String>,
        events: mpsc::Receiver<FileRecord>,
        release: oneshot::Sender<()>,
    ) -> Self {
        Self {
            channel: channel.into(),
            events,
            release: Some(release),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next announced record; `None` once the feed has ended
    pub async fn recv(&mut self) -> Option<FileRecord> {
        self.events.recv().await
    }

    pub fn unsubscribe(mut self) {
        tracing::debug!("Unsubscribing from {}", self.channel);
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            let _ = release.send(());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Token of the signed-in user, if any
    fn access_token(&self) -> Option<String>;

    // Auth
    async fn get_current_user(&self) -> Result<Option<User>, BackendError>;
    async fn create_anonymous_user(&self) -> Result<User, BackendError>;

    // Sessions
    async fn insert_session(&self, session: &NewSession) -> Result<Session, BackendError>;
    async fn get_session(&self, id: &str) -> Result<Option<Session>, BackendError>;

    // Files
    async fn insert_file(&self, file: &NewFileRecord) -> Result<FileRecord, BackendError>;
    async fn query_files(&self, filter: &FileFilter) -> Result<Vec<FileRecord>, BackendError>;
    async fn update_files(
        &self,
        ids: &[String],
        patch: &FilePatch,
    ) -> Result<Vec<FileRecord>, BackendError>;
    async fn delete_files(&self, ids: &[String], owner: &str) -> Result<(), BackendError>;

    // Object storage
    /// Store `bytes` at `path`, returning the stored path
    async fn upload_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        options: &ObjectOptions,
    ) -> Result<String, BackendError>;
    fn public_url(&self, path: &str) -> String;
    async fn download_object(&self, path: &str) -> Result<Vec<u8>, BackendError>;
    async fn remove_objects(&self, paths: &[String]) -> Result<(), BackendError>;

    // Realtime
    /// Subscribe to changes; at most `capacity` records queue up unread
    async fn subscribe(
        &self,
        channel: &str,
        spec: ChangeSubscription,
        capacity: usize,
    ) -> Result<Subscription, BackendError>;
}
