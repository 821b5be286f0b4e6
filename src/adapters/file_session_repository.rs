//! File-based session repository implementation.
//!
//! This adapter persists session *metadata* (`session.json`) under the
//! configured export root; the recorder (C6) is the single owner of the
//! per-sensor data files within that same directory while a session is
//! active. One directory per session, named after the session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

use crate::domain::session::Session;
use crate::ports::session_repository::SessionRepository;

const SESSION_METADATA_FILENAME: &str = "session.json";

/// File-based implementation of `SessionRepository`.
///
/// Stores one `<export_root>/<session_name>/session.json` per session.
#[derive(Debug, Clone)]
pub struct FileSessionRepository {
    export_root: PathBuf,
}

impl FileSessionRepository {
    /// Create a repository rooted at `export_root`, creating it if missing.
    pub async fn new(export_root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&export_root)
            .await
            .with_context(|| format!("failed to create export root: {:?}", export_root))?;
        Ok(Self { export_root })
    }

    fn session_dir(&self, name: &str) -> PathBuf {
        self.export_root.join(name)
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.session_dir(name).join(SESSION_METADATA_FILENAME)
    }

    async fn load_session(&self, path: &PathBuf) -> Result<Session> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read session metadata: {:?}", path))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse session metadata: {:?}", path))
    }
}

#[async_trait]
impl SessionRepository for FileSessionRepository {
    async fn save(&self, session: &Session) -> Result<()> {
        let dir = self.session_dir(&session.name);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create session directory: {:?}", dir))?;

        let json = serde_json::to_string_pretty(session)
            .with_context(|| format!("failed to serialize session: {}", session.name))?;

        // §4.6: Closing atomically renames a temporary file to its final name.
        let final_path = self.metadata_path(&session.name);
        let tmp_path = dir.join(format!("{SESSION_METADATA_FILENAME}.tmp"));
        fs::write(&tmp_path, json)
            .await
            .with_context(|| format!("failed to write session metadata: {:?}", tmp_path))?;
        fs::rename(&tmp_path, &final_path)
            .await
            .with_context(|| format!("failed to finalize session metadata: {:?}", final_path))?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Session>> {
        let mut entries = fs::read_dir(&self.export_root)
            .await
            .with_context(|| format!("failed to read export root: {:?}", self.export_root))?;

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let metadata_path = entry.path().join(SESSION_METADATA_FILENAME);
            if !metadata_path.exists() {
                continue;
            }
            match self.load_session(&metadata_path).await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!("failed to load session from {:?}: {}", metadata_path, e);
                }
            }
        }

        // RFC 3339 timestamps sort lexicographically the same as chronologically.
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    async fn get(&self, name: &str) -> Result<Option<Session>> {
        let path = self.metadata_path(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(self.load_session(&path).await?))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let dir = self.session_dir(name);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .await
                .with_context(|| format!("failed to delete session directory: {:?}", dir))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{DataFormat, SessionStatus};
    use chrono::Utc;

    fn sample_session(name: &str) -> Session {
        Session {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            started_at: Utc::now().to_rfc3339(),
            ended_at: None,
            data_format: DataFormat::Json,
            root_path: format!("/exports/{name}"),
            file_index: vec![],
            status: SessionStatus::Recording,
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let temp = tempfile::tempdir().unwrap();
        let repo = FileSessionRepository::new(temp.path().to_path_buf())
            .await
            .unwrap();

        let session = sample_session("session-1");
        repo.save(&session).await.unwrap();

        let loaded = repo.get("session-1").await.unwrap().unwrap();
        assert_eq!(loaded.name, session.name);
    }

    #[tokio::test]
    async fn get_unknown_session_returns_none() {
        let temp = tempfile::tempdir().unwrap();
        let repo = FileSessionRepository::new(temp.path().to_path_buf())
            .await
            .unwrap();
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_sorts_most_recent_first() {
        let temp = tempfile::tempdir().unwrap();
        let repo = FileSessionRepository::new(temp.path().to_path_buf())
            .await
            .unwrap();

        let mut older = sample_session("older");
        older.started_at = (Utc::now() - chrono::Duration::hours(2)).to_rfc3339();
        let newer = sample_session("newer");

        repo.save(&older).await.unwrap();
        repo.save(&newer).await.unwrap();

        let sessions = repo.list().await.unwrap();
        assert_eq!(sessions[0].name, "newer");
        assert_eq!(sessions[1].name, "older");
    }

    #[tokio::test]
    async fn delete_removes_session_directory() {
        let temp = tempfile::tempdir().unwrap();
        let repo = FileSessionRepository::new(temp.path().to_path_buf())
            .await
            .unwrap();

        let session = sample_session("to-delete");
        repo.save(&session).await.unwrap();
        assert!(repo.get("to-delete").await.unwrap().is_some());

        repo.delete("to-delete").await.unwrap();
        assert!(repo.get("to-delete").await.unwrap().is_none());

        // Deleting a missing session succeeds silently.
        repo.delete("still-missing").await.unwrap();
    }
}
