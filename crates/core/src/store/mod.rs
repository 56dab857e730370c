//! Persistence for finished interviews and user profiles.
//!
//! Two backends implement [`InterviewStore`]: one JSON document per record
//! on disk ([`FileInterviewStore`]) or a single SQLite database
//! ([`SqliteInterviewStore`]). Processes pick one with [`open_store`].

mod file;
mod sqlite;

pub use file::FileInterviewStore;
pub use sqlite::SqliteInterviewStore;

use crate::profile::UserProfile;
use crate::session_state::{InterviewOverview, InterviewRecord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("deserialization error at {path}: {message}")]
    Deserialization { path: PathBuf, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Database(String),

    /// Ids become file names, so only `[A-Za-z0-9_-]` is accepted.
    #[error("invalid {kind} id: {id:?}")]
    InvalidId { kind: &'static str, id: String },
}

impl StoreError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait InterviewStore: Send + Sync {
    async fn save_interview(&self, record: &InterviewRecord) -> StoreResult<()>;

    /// `Ok(None)` when no interview has that id.
    async fn load_interview(&self, interview_id: &str) -> StoreResult<Option<InterviewRecord>>;

    /// Overviews of a user's interviews, newest first.
    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<InterviewOverview>>;

    async fn save_profile(&self, profile: &UserProfile) -> StoreResult<()>;

    async fn load_profile(&self, user_id: &str) -> StoreResult<Option<UserProfile>>;
}

/// Which `InterviewStore` a process keeps its records in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" | "json" => Ok(StoreBackend::File),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Opens the configured store. `storage_dir` is used by the file backend,
/// `db_path` by SQLite.
pub fn open_store(
    backend: StoreBackend,
    storage_dir: &Path,
    db_path: &Path,
) -> StoreResult<Arc<dyn InterviewStore>> {
    match backend {
        StoreBackend::File => {
            tracing::info!("Storing interviews under {}", storage_dir.display());
            Ok(Arc::new(FileInterviewStore::new(storage_dir)))
        }
        StoreBackend::Sqlite => Ok(Arc::new(SqliteInterviewStore::open(db_path)?)),
    }
}

fn validate_id(kind: &'static str, id: &str) -> StoreResult<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId {
            kind,
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
fn record_for(user_id: &str, hours_ago: i64, score: f64) -> InterviewRecord {
    use crate::session_state::Session;
    use crate::validator::Summary;
    use chrono::{Duration, Utc};

    let mut session = Session::new(user_id, "software_engineer", "mid");
    let start = Utc::now() - Duration::hours(hours_ago);
    session.start_time = Some(start);
    session.end_time = Some(start + Duration::minutes(20));
    session.to_record(Summary {
        score,
        ..Summary::default()
    })
}
