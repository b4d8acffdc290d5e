use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for shared::User {
    fn from(row: User) -> Self {
        shared::User {
            id: row.id,
            is_anonymous: row.is_anonymous,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for shared::Session {
    fn from(row: Session) -> Self {
        shared::Session {
            id: row.id,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct File {
    pub id: String,
    pub user_id: String,
    pub receiver_id: String,
    pub session_id: Option<String>,
    pub name: String,
    pub size: i64,
    #[sqlx(rename = "type")]
    pub mime_type: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl From<File> for shared::FileRecord {
    fn from(row: File) -> Self {
        shared::FileRecord {
            id: row.id,
            user_id: row.user_id,
            receiver_id: row.receiver_id,
            session_id: row.session_id,
            name: row.name,
            size: row.size,
            mime_type: row.mime_type,
            url: row.url,
            created_at: row.created_at,
            is_deleted: row.is_deleted,
        }
    }
}
