use dashmap::DashMap;
use shared::{ChangeEvent, ChangeFilter, FileRecord, RealtimeServerMessage};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Table whose inserts are announced over realtime
pub const FILES_TABLE: &str = "files";

/// Routes row change notifications to websocket connections
pub struct RealtimeHub {
    /// Map of connection ID -> sender to that connection
    connections: DashMap<Uuid, mpsc::Sender<RealtimeServerMessage>>,
    /// Map of (connection ID, channel) -> subscription
    subscriptions: DashMap<(Uuid, String), Subscription>,
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub connection_id: Uuid,
    pub channel: String,
    pub event: ChangeEvent,
    pub filter: ChangeFilter,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            subscriptions: DashMap::new(),
        }
    }

    // Connection management
    pub fn register(&self, connection_id: Uuid, sender: mpsc::Sender<RealtimeServerMessage>) {
        self.connections.insert(connection_id, sender);
        tracing::info!("Realtime client registered: {}", connection_id);
    }

    /// Drop the connection along with every subscription it still holds
    pub fn unregister(&self, connection_id: &Uuid) {
        self.connections.remove(connection_id);
        self.subscriptions
            .retain(|(conn, _), _| conn != connection_id);
        tracing::info!("Realtime client unregistered: {}", connection_id);
    }

    // Subscription management
    pub fn subscribe(&self, subscription: Subscription) {
        tracing::info!(
            "Connection {} subscribed to {} ({})",
            subscription.connection_id,
            subscription.channel,
            subscription.filter
        );
        let key = (subscription.connection_id, subscription.channel.clone());
        self.subscriptions.insert(key, subscription);
    }

    pub fn unsubscribe(&self, connection_id: Uuid, channel: &str) -> bool {
        let removed = self
            .subscriptions
            .remove(&(connection_id, channel.to_string()))
            .is_some();
        if removed {
            tracing::info!("Connection {} unsubscribed from {}", connection_id, channel);
        }
        removed
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub async fn send_to(&self, connection_id: &Uuid, msg: RealtimeServerMessage) -> bool {
        let sender = self.connections.get(connection_id).map(|s| s.clone());
        match sender {
            Some(sender) => sender.send(msg).await.is_ok(),
            None => false,
        }
    }

    /// Announce a new file row to every matching subscription.
    ///
    /// Never waits on a slow consumer: a full outbound queue drops the event
    /// for that connection. Returns the number of deliveries queued.
    pub fn publish_insert(&self, record: &FileRecord) -> usize {
        let matching: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.event == ChangeEvent::Insert && entry.filter.matches(record))
            .map(|entry| entry.value().clone())
            .collect();

        let mut delivered = 0;
        for subscription in matching {
            let Some(sender) = self
                .connections
                .get(&subscription.connection_id)
                .map(|s| s.clone())
            else {
                continue;
            };

            let msg = RealtimeServerMessage::Change {
                channel: subscription.channel.clone(),
                event: ChangeEvent::Insert,
                record: record.clone(),
            };
            match sender.try_send(msg) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        "Dropping change for {} on {}: outbound queue full",
                        subscription.connection_id,
                        subscription.channel
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Connection {} already closed", subscription.connection_id);
                }
            }
        }

        tracing::debug!("Published insert of file {} to {} subscribers", record.id, delivered);
        delivered
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}
