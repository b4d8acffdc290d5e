use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Storage bucket holding every uploaded object.
pub const BUCKET: &str = "file_uploads";

/// How long a freshly created session accepts uploads.
pub const SESSION_TTL_HOURS: i64 = 24;

/// Length of generated session identifiers.
pub const SESSION_ID_LEN: usize = 8;

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

/// Returned by the anonymous sign-in endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A session accepts uploads until `expires_at`; the row's other columns
    /// play no part in the decision.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at >= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub id: String,
    pub expires_at: DateTime<Utc>,
}

impl NewSession {
    pub fn starting_at(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            expires_at: now + Duration::hours(SESSION_TTL_HOURS),
        }
    }
}

// ============================================================================
// Files
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    /// Uploader
    pub user_id: String,
    /// Session id or recipient user id the file was sent to
    pub receiver_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub name: String,
    pub size: i64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl FileRecord {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn is_received_by(&self, user_id: &str) -> bool {
        self.receiver_id == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFileRecord {
    pub user_id: String,
    pub receiver_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub name: String,
    pub size: i64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub url: String,
}

/// Fields a client may change on existing rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
}

impl FilePatch {
    pub fn soft_delete() -> Self {
        Self {
            is_deleted: Some(true),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_deleted.is_none()
    }
}

/// Row filter for file queries. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFilter {
    /// Matches rows where the user is either uploader or receiver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub involving: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl FileFilter {
    pub fn involving(user_id: impl Into<String>) -> Self {
        Self {
            involving: Some(user_id.into()),
            include_deleted: true,
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &FileRecord) -> bool {
        if !self.include_deleted && record.is_deleted {
            return false;
        }
        if let Some(id) = &self.involving {
            if record.user_id != *id && record.receiver_id != *id {
                return false;
            }
        }
        if let Some(id) = &self.user_id {
            if record.user_id != *id {
                return false;
            }
        }
        if let Some(id) = &self.receiver_id {
            if record.receiver_id != *id {
                return false;
            }
        }
        if let Some(id) = &self.session_id {
            if record.session_id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFilesRequest {
    pub ids: Vec<String>,
    pub patch: FilePatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFilesRequest {
    pub ids: Vec<String>,
    /// Only rows uploaded by this user are removed
    pub owner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFilesResponse {
    pub deleted: u64,
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    /// Path inside the bucket
    pub path: String,
    /// Bucket-qualified path
    pub full_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveObjectsRequest {
    pub paths: Vec<String>,
}

/// Extract the in-bucket object path from a public object URL
pub fn object_path_from_url(url: &str) -> Option<&str> {
    let marker = format!("/public/{}/", BUCKET);
    url.split_once(marker.as_str())
        .map(|(_, path)| path)
        .filter(|path| !path.is_empty())
}
