//! Integration tests driving the full `Engine` through a real (mocked) BLE
//! lifecycle: scan, connect, stream, disconnect. Unlike the unit tests in
//! `state::device_link`, these exercise the whole wiring — mock adapter,
//! device link, router, per-sensor pipelines, and recorder — together.

use std::sync::Arc;
use std::time::Duration;

use linkband_server::adapters::{FileSessionRepository, MockAdapter, SqliteDeviceCatalogue};
use linkband_server::config::ServerConfig;
use linkband_server::domain::reconnection::ConnectionStatus;
use linkband_server::domain::session::DataFormat;
use linkband_server::engine::Engine;
use linkband_server::ports::{BleAdapter, DeviceCatalogue, SessionRepository};
use linkband_server::state::RecorderRunner;

async fn test_engine(export_root: &std::path::Path) -> Arc<Engine> {
    let config = ServerConfig {
        export_root: export_root.to_path_buf(),
        ..Default::default()
    };
    let adapter: Arc<dyn BleAdapter + Send + Sync> = Arc::new(MockAdapter::new());
    let device_catalogue: Arc<dyn DeviceCatalogue> = Arc::new(
        SqliteDeviceCatalogue::open(export_root.join("devices.sqlite3")).unwrap(),
    );
    let session_repo: Arc<dyn SessionRepository> = Arc::new(
        FileSessionRepository::new(export_root.to_path_buf())
            .await
            .unwrap(),
    );
    let recorder = Arc::new(RecorderRunner::new(export_root.to_path_buf(), session_repo));
    Engine::new(config, adapter, device_catalogue, recorder)
}

#[tokio::test]
async fn scan_discovers_devices_and_register_persists_them() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path()).await;

    let devices = engine.scan(Duration::from_millis(100)).await.unwrap();
    assert!(!devices.is_empty());
    assert!(devices.iter().all(|d| !d.is_registered));

    engine
        .register_device(&devices[0].id, "my headband")
        .await
        .unwrap();
    let registered = engine.list_devices().await.unwrap();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].name, "my headband");
}

#[tokio::test]
async fn connect_transitions_to_streaming_and_routes_samples() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path()).await;

    let devices = engine.scan(Duration::from_millis(100)).await.unwrap();
    let device_id = devices[0].id.clone();

    engine.connect(&device_id).await.unwrap();
    assert!(engine.is_streaming());
    assert_eq!(
        engine.connection_status(),
        ConnectionStatus::Connected {
            device_id: device_id.clone()
        }
    );

    // Give the router a moment to see at least one decoded sample.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats = engine.pipelines.router.stats();
    assert!(stats.values().any(|s| s.rate_hz > 0.0));

    engine.disconnect().await.unwrap();
    assert!(!engine.is_streaming());
    assert_eq!(engine.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn disconnect_does_not_spuriously_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path()).await;

    let devices = engine.scan(Duration::from_millis(100)).await.unwrap();
    let device_id = devices[0].id.clone();

    engine.connect(&device_id).await.unwrap();
    engine.disconnect().await.unwrap();

    // The notification stream closing after disconnect used to wake the
    // link-loss supervisor and race it into reconnecting; give that window
    // time to elapse and confirm the link stays down.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!engine.is_streaming());
    assert_eq!(engine.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn battery_reads_back_the_mock_level() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path()).await;

    let devices = engine.scan(Duration::from_millis(100)).await.unwrap();
    engine.connect(&devices[0].id).await.unwrap();

    let level = engine.battery().await.unwrap();
    assert_eq!(level, Some(85));
}

#[tokio::test]
async fn record_session_while_streaming_and_stop_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path()).await;

    let devices = engine.scan(Duration::from_millis(100)).await.unwrap();
    engine.connect(&devices[0].id).await.unwrap();

    let session = engine
        .recorder
        .start_recording("itest-session".to_string(), DataFormat::Json)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let first_stop = engine.recorder.stop_recording().await.unwrap();
    assert_eq!(first_stop.id, session.id);

    let second_stop = engine.recorder.stop_recording().await.unwrap();
    assert_eq!(second_stop.id, session.id, "second stop must return the same session");
}
