use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::FileRecord;

// ============================================================================
// Realtime subscription description
// ============================================================================

/// Row change kinds a subscriber can listen for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEvent {
    #[default]
    Insert,
}

/// Columns a realtime filter may compare against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterColumn {
    SessionId,
    ReceiverId,
}

impl FilterColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterColumn::SessionId => "session_id",
            FilterColumn::ReceiverId => "receiver_id",
        }
    }
}

/// Equality filter on one column, written `column=eq.value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFilter {
    pub column: FilterColumn,
    pub value: String,
}

impl ChangeFilter {
    pub fn session(id: impl Into<String>) -> Self {
        Self {
            column: FilterColumn::SessionId,
            value: id.into(),
        }
    }

    pub fn receiver(id: impl Into<String>) -> Self {
        Self {
            column: FilterColumn::ReceiverId,
            value: id.into(),
        }
    }

    pub fn matches(&self, record: &FileRecord) -> bool {
        match self.column {
            FilterColumn::SessionId => record.session_id.as_deref() == Some(self.value.as_str()),
            FilterColumn::ReceiverId => record.receiver_id == self.value,
        }
    }
}

impl fmt::Display for ChangeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column.as_str(), self.value)
    }
}

// ============================================================================
// Client <-> Server realtime messages
// ============================================================================

/// Messages sent from a realtime client to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeClientMessage {
    /// Start receiving changes on `table` that match `filter`
    Subscribe {
        channel: String,
        table: String,
        #[serde(default)]
        event: ChangeEvent,
        filter: ChangeFilter,
    },

    /// Stop receiving changes for a channel
    Unsubscribe { channel: String },

    /// Keep the connection alive
    Heartbeat,
}

/// Messages sent from the server to a realtime client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeServerMessage {
    /// Subscription is live
    Subscribed { channel: String },

    /// Subscription was released
    Unsubscribed { channel: String },

    /// A row matching the channel's filter changed
    Change {
        channel: String,
        event: ChangeEvent,
        record: FileRecord,
    },

    /// Error message
    Error { message: String },

    /// Heartbeat response
    Heartbeat,
}

impl RealtimeServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
