//! Integration tests for the session repository's storage lifecycle.
//!
//! Verifies the end-to-end CRUD cycle on disk: saving session metadata,
//! listing sessions back out in most-recent-first order, retrieving a
//! single session by name, and deleting one.

use linkband_server::adapters::FileSessionRepository;
use linkband_server::domain::session::{DataFormat, FileIndexEntry, Session, SessionStatus};
use linkband_server::ports::SessionRepository;
use tempfile::TempDir;

fn test_session(name: &str, started_at: &str, root: &std::path::Path) -> Session {
    Session {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        started_at: started_at.to_string(),
        ended_at: Some(format!("{started_at}-ended")),
        data_format: DataFormat::Json,
        root_path: root.join(name).to_string_lossy().into_owned(),
        file_index: vec![FileIndexEntry {
            sensor_kind: "eeg".to_string(),
            kind: "raw".to_string(),
            path: "eeg_raw.jsonl".to_string(),
            byte_size: 1024,
            sample_count: 250,
        }],
        status: SessionStatus::Completed,
    }
}

#[tokio::test]
async fn session_crud_cycle() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let repo = FileSessionRepository::new(dir.path().to_path_buf())
        .await
        .expect("failed to create repository");

    let older = test_session("session-a", "2026-01-01T00:00:00Z", dir.path());
    let newer = test_session("session-b", "2026-01-02T00:00:00Z", dir.path());

    repo.save(&older).await.expect("save older session");
    repo.save(&newer).await.expect("save newer session");

    let listed = repo.list().await.expect("list sessions");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].name, "session-b", "most recently started session must come first");
    assert_eq!(listed[1].name, "session-a");

    let fetched = repo.get("session-a").await.expect("get session-a").expect("session-a exists");
    assert_eq!(fetched.id, older.id);
    assert_eq!(fetched.total_bytes(), 1024);
    assert!(fetched.all_files_non_empty());

    assert!(repo.get("does-not-exist").await.expect("get missing is not an error").is_none());

    repo.delete("session-a").await.expect("delete session-a");
    assert!(repo.get("session-a").await.expect("get after delete").is_none());
    let remaining = repo.list().await.expect("list after delete");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "session-b");
}

#[tokio::test]
async fn overwriting_a_session_replaces_its_metadata() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let repo = FileSessionRepository::new(dir.path().to_path_buf())
        .await
        .expect("failed to create repository");

    let mut session = test_session("session-c", "2026-01-03T00:00:00Z", dir.path());
    repo.save(&session).await.expect("save initial");

    session.status = SessionStatus::Aborted;
    session.file_index[0].byte_size = 2048;
    repo.save(&session).await.expect("save updated");

    let fetched = repo.get("session-c").await.expect("get session-c").expect("session-c exists");
    assert_eq!(fetched.status, SessionStatus::Aborted);
    assert_eq!(fetched.total_bytes(), 2048);
}

#[tokio::test]
async fn deleting_an_unknown_session_succeeds_silently() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let repo = FileSessionRepository::new(dir.path().to_path_buf())
        .await
        .expect("failed to create repository");

    repo.delete("never-existed").await.expect("delete of unknown session must not error");
}
