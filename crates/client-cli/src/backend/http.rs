use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::{header, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shared::{
    AuthResponse, DeleteFilesRequest, FileFilter, FilePatch, FileRecord, NewFileRecord,
    NewSession, RealtimeClientMessage, RealtimeServerMessage, RemoveObjectsRequest, Session,
    StoredObject, UpdateFilesRequest, User, BUCKET,
};
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Backend, ChangeSubscription, ObjectOptions, Subscription};
use crate::error::BackendError;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const UPSERT_HEADER: &str = "x-upsert";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Backend reached over HTTP and a realtime websocket
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    token: RwLock<Option<String>>,
}

impl HttpBackend {
    pub fn new(server_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        // Accept ws:// style addresses too
        let http_url = server_url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let base_url = Url::parse(&http_url)
            .with_context(|| format!("Invalid server URL: {}", server_url))?;
        if base_url.cannot_be_a_base() {
            bail!("Invalid server URL: {}", server_url);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            token: RwLock::new(token),
        })
    }

    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    fn set_token(&self, token: String) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token);
        }
    }

    /// `base_url` with `segments` appended; each segment is percent-encoded
    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn realtime_url(&self) -> Result<String, BackendError> {
        let token = self
            .token()
            .ok_or_else(|| BackendError::Realtime("not signed in".to_string()))?;

        let mut url = self.url(["realtime"]);
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| BackendError::Realtime(format!("cannot use {} for realtime", url)))?;
        url.query_pairs_mut().append_pair("token", &token);
        Ok(url.to_string())
    }
}

/// Turn non-success responses into typed errors
async fn check(resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);

    Err(match status {
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        StatusCode::CONFLICT => BackendError::Conflict(message),
        _ => BackendError::Status {
            status: status.as_u16(),
            message,
        },
    })
}

async fn json<T: DeserializeOwned>(resp: Response) -> Result<T, BackendError> {
    let resp = check(resp).await?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl Backend for HttpBackend {
    fn access_token(&self) -> Option<String> {
        self.token()
    }

    async fn get_current_user(&self) -> Result<Option<User>, BackendError> {
        if self.token().is_none() {
            return Ok(None);
        }

        let resp = self
            .request(Method::GET, self.url(["auth", "user"]))
            .send()
            .await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!("Stored token was rejected");
            return Ok(None);
        }
        json(resp).await.map(Some)
    }

    async fn create_anonymous_user(&self) -> Result<User, BackendError> {
        let resp = self
            .client
            .post(self.url(["auth", "anonymous"]))
            .send()
            .await?;
        let auth: AuthResponse = json(resp).await?;
        self.set_token(auth.token);
        Ok(auth.user)
    }

    async fn insert_session(&self, session: &NewSession) -> Result<Session, BackendError> {
        let resp = self
            .request(Method::POST, self.url(["rest", "sessions"]))
            .json(session)
            .send()
            .await?;
        json(resp).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, BackendError> {
        let resp = self
            .request(Method::GET, self.url(["rest", "sessions", id]))
            .send()
            .await?;
        match json(resp).await {
            Ok(session) => Ok(Some(session)),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn insert_file(&self, file: &NewFileRecord) -> Result<FileRecord, BackendError> {
        let resp = self
            .request(Method::POST, self.url(["rest", "files"]))
            .json(file)
            .send()
            .await?;
        json(resp).await
    }

    async fn query_files(&self, filter: &FileFilter) -> Result<Vec<FileRecord>, BackendError> {
        let resp = self
            .request(Method::GET, self.url(["rest", "files"]))
            .query(filter)
            .send()
            .await?;
        json(resp).await
    }

    async fn update_files(
        &self,
        ids: &[String],
        patch: &FilePatch,
    ) -> Result<Vec<FileRecord>, BackendError> {
        let body = UpdateFilesRequest {
            ids: ids.to_vec(),
            patch: patch.clone(),
        };
        let resp = self
            .request(Method::PATCH, self.url(["rest", "files"]))
            .json(&body)
            .send()
            .await?;
        json(resp).await
    }

    async fn delete_files(&self, ids: &[String], owner: &str) -> Result<(), BackendError> {
        let body = DeleteFilesRequest {
            ids: ids.to_vec(),
            owner: owner.to_string(),
        };
        let resp = self
            .request(Method::DELETE, self.url(["rest", "files"]))
            .json(&body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn upload_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        options: &ObjectOptions,
    ) -> Result<String, BackendError> {
        let url = self.url(["storage", "object", BUCKET].into_iter().chain(path.split('/')));
        let mut req = self
            .request(Method::PUT, url)
            .header(header::CACHE_CONTROL, &options.cache_control)
            .header(UPSERT_HEADER, options.upsert.to_string());
        if let Some(content_type) = &options.content_type {
            req = req.header(header::CONTENT_TYPE, content_type);
        }

        let stored: StoredObject = json(req.body(bytes).send().await?).await?;
        Ok(stored.path)
    }

    fn public_url(&self, path: &str) -> String {
        self.url(
            ["storage", "object", "public", BUCKET]
                .into_iter()
                .chain(path.split('/')),
        )
        .to_string()
    }

    async fn download_object(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        let resp = self
            .client
            .get(self.public_url(path))
            .send()
            .await?;
        let resp = check(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn remove_objects(&self, paths: &[String]) -> Result<(), BackendError> {
        let body = RemoveObjectsRequest {
            paths: paths.to_vec(),
        };
        let resp = self
            .request(Method::DELETE, self.url(["storage", "object", BUCKET]))
            .json(&body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        spec: ChangeSubscription,
        capacity: usize,
    ) -> Result<Subscription, BackendError> {
        let ws_url = self.realtime_url()?;
        tracing::info!("Connecting to realtime for {}", channel);

        let (ws_stream, _) = connect_async(ws_url).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let subscribe = RealtimeClientMessage::Subscribe {
            channel: channel.to_string(),
            table: spec.table,
            event: spec.event,
            filter: spec.filter,
        };
        ws_sender
            .send(Message::Text(serde_json::to_string(&subscribe)?))
            .await?;

        // Wait for the subscription to be acknowledged
        loop {
            match ws_receiver.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<RealtimeServerMessage>(&text)? {
                        RealtimeServerMessage::Subscribed { channel: acked } if acked == channel => {
                            break
                        }
                        RealtimeServerMessage::Error { message } => {
                            return Err(BackendError::Realtime(message))
                        }
                        _ => continue,
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(BackendError::Realtime(
                        "connection closed before subscribing".to_string(),
                    ))
                }
            }
        }
        tracing::info!("Subscribed to {}", channel);

        let (tx, rx) = mpsc::channel(capacity);
        let (release_tx, mut release_rx) = oneshot::channel::<()>();
        let task_channel = channel.to_string();

        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;

            loop {
                tokio::select! {
                    _ = &mut release_rx => {
                        let unsubscribe = RealtimeClientMessage::Unsubscribe { channel: task_channel.clone() };
                        if let Ok(text) = serde_json::to_string(&unsubscribe) {
                            let _ = ws_sender.send(Message::Text(text)).await;
                        }
                        let _ = ws_sender.close().await;
                        break;
                    }
                    _ = heartbeat.tick() => {
                        if let Ok(text) = serde_json::to_string(&RealtimeClientMessage::Heartbeat) {
                            if ws_sender.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                    }
                    msg = ws_receiver.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<RealtimeServerMessage>(&text) {
                                Ok(RealtimeServerMessage::Change { channel, record, .. }) if channel == task_channel => {
                                    if tx.send(record).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(RealtimeServerMessage::Error { message }) => {
                                    tracing::warn!("Realtime error on {}: {}", task_channel, message);
                                }
                                Ok(_) => {}
                                Err(e) => tracing::warn!("Failed to parse realtime message: {}", e),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::warn!("Realtime connection for {} closed", task_channel);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!("Realtime connection for {} failed: {}", task_channel, e);
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Realtime task for {} finished", task_channel);
        });

        Ok(Subscription::new(channel, rx, release_tx))
    }
}
