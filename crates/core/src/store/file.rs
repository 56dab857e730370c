//! One JSON document per interview at `{root}/interviews/{id}.json` and one
//! per user at `{root}/profiles/{user_id}.json`. All writes go through a
//! temp file and a rename.

use super::{InterviewStore, StoreError, StoreResult, validate_id};
use crate::profile::UserProfile;
use crate::session_state::{InterviewOverview, InterviewRecord};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone)]
pub struct FileInterviewStore {
    root: PathBuf,
}

impl FileInterviewStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn interviews_dir(&self) -> PathBuf {
        self.root.join("interviews")
    }

    fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    async fn write_json<T: Serialize + Sync>(dir: &Path, id: &str, value: &T) -> StoreResult<()> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::io(dir, e))?;

        let path = dir.join(format!("{id}.json"));
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        fs::write(&temp_path, content)
            .await
            .map_err(|e| StoreError::io(&temp_path, e))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        tracing::debug!(path = %path.display(), "Saved document");
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
        let content = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Deserialization {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl InterviewStore for FileInterviewStore {
    async fn save_interview(&self, record: &InterviewRecord) -> StoreResult<()> {
        validate_id("interview", &record.interview_id)?;
        Self::write_json(&self.interviews_dir(), &record.interview_id, record).await
    }

    async fn load_interview(&self, interview_id: &str) -> StoreResult<Option<InterviewRecord>> {
        validate_id("interview", interview_id)?;
        let path = self.interviews_dir().join(format!("{interview_id}.json"));
        Self::read_json(&path).await
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<InterviewOverview>> {
        let dir = self.interviews_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut overviews = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&dir, e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            match Self::read_json::<InterviewRecord>(&path).await {
                Ok(Some(record)) if record.user_id == user_id => {
                    overviews.push(InterviewOverview::from(&record));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable interview");
                }
            }
        }

        overviews.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(overviews)
    }

    async fn save_profile(&self, profile: &UserProfile) -> StoreResult<()> {
        validate_id("user", &profile.user_id)?;
        Self::write_json(&self.profiles_dir(), &profile.user_id, profile).await
    }

    async fn load_profile(&self, user_id: &str) -> StoreResult<Option<UserProfile>> {
        validate_id("user", user_id)?;
        let path = self.profiles_dir().join(format!("{user_id}.json"));
        Self::read_json(&path).await
    }
}
