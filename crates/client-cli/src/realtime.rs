use shared::{ChangeFilter, FileRecord};

use crate::backend::{Backend, ChangeSubscription, Subscription};
use crate::error::BackendError;

/// Records that may queue up before the listener reads them
pub const DEFAULT_CAPACITY: usize = 64;

/// Which new files a listener is told about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenScope {
    SessionId(String),
    ReceiverId(String),
}

impl ListenScope {
    pub fn channel_key(&self) -> String {
        match self {
            ListenScope::SessionId(id) => format!("session-{}", id),
            ListenScope::ReceiverId(id) => format!("receiver-{}", id),
        }
    }

    pub fn filter(&self) -> ChangeFilter {
        match self {
            ListenScope::SessionId(id) => ChangeFilter::session(id.clone()),
            ListenScope::ReceiverId(id) => ChangeFilter::receiver(id.clone()),
        }
    }
}

/// Collects files announced on a realtime subscription
pub struct RealtimeListener {
    scope: ListenScope,
    capacity: usize,
    subscription: Option<Subscription>,
    files: Vec<FileRecord>,
}

impl RealtimeListener {
    pub async fn start(
        backend: &dyn Backend,
        scope: ListenScope,
        capacity: usize,
    ) -> Result<Self, BackendError> {
        let subscription = subscribe(backend, &scope, capacity).await?;
        Ok(Self {
            scope,
            capacity,
            subscription: Some(subscription),
            files: Vec::new(),
        })
    }

    pub fn scope(&self) -> &ListenScope {
        &self.scope
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    /// Wait for the next announced file and append it to the list.
    ///
    /// Returns `None` once the feed has ended or after [`unsubscribe`](Self::unsubscribe).
    pub async fn next(&mut self) -> Option<&FileRecord> {
        let record = self.subscription.as_mut()?.recv().await?;
        tracing::info!("New file received! {} ({} bytes)", record.name, record.size);
        self.files.push(record);
        self.files.last()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    /// Listen on a different scope; the old subscription is released first
    pub async fn rescope(&mut self, backend: &dyn Backend, scope: ListenScope) -> Result<(), BackendError> {
        self.unsubscribe();
        self.subscription = Some(subscribe(backend, &scope, self.capacity).await?);
        self.scope = scope;
        Ok(())
    }
}

async fn subscribe(
    backend: &dyn Backend,
    scope: &ListenScope,
    capacity: usize,
) -> Result<Subscription, BackendError> {
    let channel = scope.channel_key();
    tracing::debug!("Subscribing to {} ({})", channel, scope.filter());
    backend
        .subscribe(
            &channel,
            ChangeSubscription::file_inserts(scope.filter()),
            capacity,
        )
        .await
}
