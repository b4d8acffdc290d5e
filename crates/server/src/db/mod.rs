use anyhow::Result;
use chrono::Utc;
use shared::{FileFilter, FilePatch, NewFileRecord, NewSession};
use sqlx::{sqlite::SqlitePoolOptions, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;
use uuid::Uuid;

mod models;

pub use models::*;

const FILE_COLUMNS: &str =
    r#"id, user_id, receiver_id, session_id, name, size, "type", url, created_at, is_deleted"#;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(path: &str) -> Result<Self> {
        // Ensure the directory exists
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                is_anonymous BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at DATETIME NOT NULL,
                expires_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                receiver_id TEXT NOT NULL,
                session_id TEXT REFERENCES sessions(id),
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                "type" TEXT NOT NULL,
                url TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                is_deleted BOOLEAN NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_receiver ON files(receiver_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_user ON files(user_id)")
            .execute(&self.pool)
            .await?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // User operations
    pub async fn create_anonymous_user(&self) -> Result<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            is_anonymous: true,
            created_at: Utc::now(),
        };
        sqlx::query("INSERT INTO users (id, is_anonymous, created_at) VALUES (?, ?, ?)")
            .bind(&user.id)
            .bind(user.is_anonymous)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, is_anonymous, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    // Session operations

    /// Returns `None` when a session with the same id already exists
    pub async fn create_session(&self, session: &NewSession) -> Result<Option<Session>> {
        let row = Session {
            id: session.id.clone(),
            created_at: Utc::now(),
            expires_at: session.expires_at,
        };
        let result = sqlx::query(
            "INSERT OR IGNORE INTO sessions (id, created_at, expires_at) VALUES (?, ?, ?)",
        )
        .bind(&row.id)
        .bind(row.created_at)
        .bind(row.expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(row))
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, created_at, expires_at FROM sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    // File operations
    pub async fn insert_file(&self, file: &NewFileRecord) -> Result<File> {
        let row = File {
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
        sqlx::query(&format!(
            "INSERT INTO files ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            FILE_COLUMNS
        ))
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.receiver_id)
        .bind(&row.session_id)
        .bind(&row.name)
        .bind(row.size)
        .bind(&row.mime_type)
        .bind(&row.url)
        .bind(row.created_at)
        .bind(row.is_deleted)
        .execute(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn query_files(&self, filter: &FileFilter) -> Result<Vec<File>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM files WHERE 1 = 1", FILE_COLUMNS));

        if let Some(id) = &filter.involving {
            query
                .push(" AND (user_id = ")
                .push_bind(id.clone())
                .push(" OR receiver_id = ")
                .push_bind(id.clone())
                .push(")");
        }
        if let Some(id) = &filter.user_id {
            query.push(" AND user_id = ").push_bind(id.clone());
        }
        if let Some(id) = &filter.receiver_id {
            query.push(" AND receiver_id = ").push_bind(id.clone());
        }
        if let Some(id) = &filter.session_id {
            query.push(" AND session_id = ").push_bind(id.clone());
        }
        if !filter.include_deleted {
            query.push(" AND is_deleted = 0");
        }
        query.push(" ORDER BY created_at ASC, rowid ASC");

        let files = query
            .build_query_as::<File>()
            .fetch_all(&self.pool)
            .await?;
        Ok(files)
    }

    /// Apply `patch` to the listed rows the actor uploaded or received.
    /// Returns the rows the actor may see after the update.
    pub async fn update_files(
        &self,
        ids: &[String],
        patch: &FilePatch,
        actor: &str,
    ) -> Result<Vec<File>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(is_deleted) = patch.is_deleted {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE files SET is_deleted = ");
            query.push_bind(is_deleted);
            push_id_and_actor_clause(&mut query, ids, actor);
            query.build().execute(&self.pool).await?;
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM files", FILE_COLUMNS));
        push_id_and_actor_clause(&mut query, ids, actor);
        let files = query
            .build_query_as::<File>()
            .fetch_all(&self.pool)
            .await?;
        Ok(files)
    }

    /// Remove the listed rows uploaded by `owner`, returning how many went away
    pub async fn delete_files(&self, ids: &[String], owner: &str) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM files WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");
        query.push(" AND user_id = ").push_bind(owner.to_string());

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn push_id_and_actor_clause(query: &mut QueryBuilder<'_, Sqlite>, ids: &[String], actor: &str) {
    query.push(" WHERE id IN (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");
    query
        .push(" AND (user_id = ")
        .push_bind(actor.to_string())
        .push(" OR receiver_id = ")
        .push_bind(actor.to_string())
        .push(")");
}
