//! In-process backend used by tests, with switches for injecting failures.

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    ChangeFilter, FileFilter, FilePatch, FileRecord, NewFileRecord, NewSession, Session, User,
    BUCKET,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::{Backend, ChangeSubscription, ObjectOptions, Subscription};
use crate::error::BackendError;

struct MemorySubscriber {
    filter: ChangeFilter,
    sender: mpsc::Sender<FileRecord>,
    release: oneshot::Receiver<()>,
}

impl MemorySubscriber {
    fn is_live(&mut self) -> bool {
        matches!(
            self.release.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        )
    }
}

#[derive(Default)]
struct MemoryState {
    user: Option<User>,
    token: Option<String>,
    sessions: HashMap<String, Session>,
    files: Vec<FileRecord>,
    objects: HashMap<String, Vec<u8>>,
    subscribers: Vec<MemorySubscriber>,
    uploaded_paths: Vec<String>,
    failing_uploads: HashSet<String>,
    failing_removals: HashSet<String>,
    fail_row_deletes: bool,
    fail_session_lookups: bool,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with `id` already signed in
    pub fn signed_in(id: &str) -> Self {
        let backend = Self::new();
        {
            let mut state = backend.state.lock().unwrap();
            state.user = Some(user(id));
            state.token = Some(format!("token-{}", id));
        }
        backend
    }

    pub fn sign_in_as(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.user = Some(user(id));
        state.token = Some(format!("token-{}", id));
    }

    pub fn put_session(&self, session: Session) {
        self.state
            .lock()
            .unwrap()
            .sessions
            .insert(session.id.clone(), session);
    }

    /// Seed a row (and its object) as if uploaded earlier
    pub fn put_file(&self, record: FileRecord) {
        let mut state = self.state.lock().unwrap();
        if let Some(path) = shared::object_path_from_url(&record.url) {
            state.objects.insert(path.to_string(), record.name.as_bytes().to_vec());
        }
        state.files.push(record);
    }

    pub fn files(&self) -> Vec<FileRecord> {
        self.state.lock().unwrap().files.clone()
    }

    pub fn has_object(&self, path: &str) -> bool {
        self.state.lock().unwrap().objects.contains_key(path)
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    /// Object paths in the order they were uploaded
    pub fn uploaded_paths(&self) -> Vec<String> {
        self.state.lock().unwrap().uploaded_paths.clone()
    }

    /// Make uploads of files named `name` fail
    pub fn fail_upload_of(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_uploads
            .insert(name.to_string());
    }

    pub fn fail_removal_of(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_removals
            .insert(path.to_string());
    }

    pub fn fail_row_deletes(&self) {
        self.state.lock().unwrap().fail_row_deletes = true;
    }

    pub fn fail_session_lookups(&self) {
        self.state.lock().unwrap().fail_session_lookups = true;
    }

    pub fn active_subscriptions(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.subscribers.retain_mut(|s| s.is_live());
        state.subscribers.len()
    }
}

fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        is_anonymous: true,
        created_at: Utc::now(),
    }
}

fn unavailable(what: &str) -> BackendError {
    BackendError::Status {
        status: 500,
        message: format!("{} unavailable", what),
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn access_token(&self) -> Option<String> {
        self.state.lock().unwrap().token.clone()
    }

    async fn get_current_user(&self) -> Result<Option<User>, BackendError> {
        Ok(self.state.lock().unwrap().user.clone())
    }

    async fn create_anonymous_user(&self) -> Result<User, BackendError> {
        let id = Uuid::new_v4().to_string();
        self.sign_in_as(&id);
        Ok(user(&id))
    }

    async fn insert_session(&self, session: &NewSession) -> Result<Session, BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.sessions.contains_key(&session.id) {
            return Err(BackendError::Conflict(format!("Session {} already exists", session.id)));
        }
        let row = Session {
            id: session.id.clone(),
            created_at: Utc::now(),
            expires_at: session.expires_at,
        };
        state.sessions.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, BackendError> {
        let state = self.state.lock().unwrap();
        if state.fail_session_lookups {
            return Err(unavailable("sessions"));
        }
        Ok(state.sessions.get(id).cloned())
    }

    async fn insert_file(&self, file: &NewFileRecord) -> Result<FileRecord, BackendError> {
        let record = FileRecord {
            id: Uuid::new_v4().to_string(),
            user_id: file.user_id.clone(),
            receiver_id: file.receiver_id.clone(),
            session_id: file.session_id.clone(),
            name: file.name.clone(),
            size: file.size,
            mime_type: file.mime_type.clone(),
            url: file.url.clone(),
            created_at: Utc::now(),
            is_deleted: false,
        };

        let mut state = self.state.lock().unwrap();
        state.files.push(record.clone());
        state.subscribers.retain_mut(|s| s.is_live());
        for subscriber in &state.subscribers {
            if subscriber.filter.matches(&record) {
                let _ = subscriber.sender.try_send(record.clone());
            }
        }
        Ok(record)
    }

    async fn query_files(&self, filter: &FileFilter) -> Result<Vec<FileRecord>, BackendError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .iter()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect())
    }

    async fn update_files(
        &self,
        ids: &[String],
        patch: &FilePatch,
    ) -> Result<Vec<FileRecord>, BackendError> {
        let mut state = self.state.lock().unwrap();
        let actor = state
            .user
            .as_ref()
            .map(|u| u.id.clone())
            .ok_or_else(|| BackendError::Status {
                status: 401,
                message: "not signed in".to_string(),
            })?;

        let mut updated = Vec::new();
        for file in state.files.iter_mut() {
            let permitted = file.is_owned_by(&actor) || file.is_received_by(&actor);
            if permitted && ids.contains(&file.id) {
                if let Some(is_deleted) = patch.is_deleted {
                    file.is_deleted = is_deleted;
                }
                updated.push(file.clone());
            }
        }
        Ok(updated)
    }

    async fn delete_files(&self, ids: &[String], owner: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_row_deletes {
            return Err(unavailable("files"));
        }
        state
            .files
            .retain(|f| !(ids.contains(&f.id) && f.user_id == owner));
        Ok(())
    }

    async fn upload_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        options: &ObjectOptions,
    ) -> Result<String, BackendError> {
        let mut state = self.state.lock().unwrap();
        let failing = state
            .failing_uploads
            .iter()
            .any(|name| path.ends_with(&format!("-{}", name)));
        if failing {
            return Err(unavailable("storage"));
        }
        if !options.upsert && state.objects.contains_key(path) {
            return Err(BackendError::Conflict(path.to_string()));
        }
        state.objects.insert(path.to_string(), bytes);
        state.uploaded_paths.push(path.to_string());
        Ok(path.to_string())
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://storage/object/public/{}/{}", BUCKET, path)
    }

    async fn download_object(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(path.to_string()))
    }

    async fn remove_objects(&self, paths: &[String]) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if paths.iter().any(|p| state.failing_removals.contains(p)) {
            return Err(unavailable("storage"));
        }
        for path in paths {
            state.objects.remove(path);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        spec: ChangeSubscription,
        capacity: usize,
    ) -> Result<Subscription, BackendError> {
        let (tx, rx) = mpsc::channel(capacity);
        let (release_tx, release_rx) = oneshot::channel();
        self.state.lock().unwrap().subscribers.push(MemorySubscriber {
            filter: spec.filter,
            sender: tx,
            release: release_rx,
        });
        Ok(Subscription::new(channel, rx, release_tx))
    }
}
