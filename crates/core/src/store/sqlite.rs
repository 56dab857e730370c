//! SQLite store: a `users` table of profiles and an `interviews` table of
//! records, each row holding the JSON document plus the columns used for
//! lookups.
//!
//! rusqlite is blocking, so every call runs on `spawn_blocking` behind a
//! shared connection.

use super::{InterviewStore, StoreError, StoreResult, validate_id};
use crate::profile::UserProfile;
use crate::session_state::{InterviewOverview, InterviewRecord};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE TABLE IF NOT EXISTS interviews (
        interview_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        start_time INTEGER NOT NULL,
        data TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_interviews_user
        ON interviews(user_id, start_time DESC);
";

#[derive(Clone)]
pub struct SqliteInterviewStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteInterviewStore {
    /// Opens or creates the database at `db_path`, creating parent
    /// directories and tables as needed.
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Opened interview database at {}", db_path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: db_path.to_path_buf(),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, data: &str) -> StoreResult<T> {
        serde_json::from_str(data).map_err(|e| StoreError::Deserialization {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl InterviewStore for SqliteInterviewStore {
    async fn save_interview(&self, record: &InterviewRecord) -> StoreResult<()> {
        validate_id("interview", &record.interview_id)?;
        let data = encode(record)?;
        let interview_id = record.interview_id.clone();
        let user_id = record.user_id.clone();
        let start_time = record.start_time.timestamp_millis();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO interviews (interview_id, user_id, start_time, data)
                 VALUES (?1, ?2, ?3, ?4)",
                params![interview_id, user_id, start_time, data],
            )?;
            tracing::debug!(interview_id = %interview_id, "Saved interview row");
            Ok(())
        })
        .await
    }

    async fn load_interview(&self, interview_id: &str) -> StoreResult<Option<InterviewRecord>> {
        validate_id("interview", interview_id)?;
        let interview_id = interview_id.to_string();

        let data: Option<String> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT data FROM interviews WHERE interview_id = ?1",
                        params![interview_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        data.map(|data| self.decode(&data)).transpose()
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<InterviewOverview>> {
        let user_id = user_id.to_string();

        let rows: Vec<(String, String)> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT interview_id, data FROM interviews
                     WHERE user_id = ?1
                     ORDER BY start_time DESC",
                )?;
                let rows = stmt.query_map(params![user_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;

        let mut overviews = Vec::with_capacity(rows.len());
        for (interview_id, data) in rows {
            match self.decode::<InterviewRecord>(&data) {
                Ok(record) => overviews.push(InterviewOverview::from(&record)),
                Err(e) => {
                    tracing::warn!(interview_id = %interview_id, error = %e, "Skipping unreadable interview");
                }
            }
        }
        Ok(overviews)
    }

    async fn save_profile(&self, profile: &UserProfile) -> StoreResult<()> {
        validate_id("user", &profile.user_id)?;
        let data = encode(profile)?;
        let user_id = profile.user_id.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (user_id, data) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE
                 SET data = excluded.data, updated_at = datetime('now')",
                params![user_id, data],
            )?;
            Ok(())
        })
        .await
    }

    async fn load_profile(&self, user_id: &str) -> StoreResult<Option<UserProfile>> {
        validate_id("user", user_id)?;
        let user_id = user_id.to_string();

        let data: Option<String> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT data FROM users WHERE user_id = ?1",
                        params![user_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        data.map(|data| self.decode(&data)).transpose()
    }
}
