//! `linkband-server` — binds the HTTP + WebSocket listener and runs until a
//! shutdown signal arrives.
//!
//! Exit codes per §6: `0` clean shutdown, `1` fatal startup error (port
//! bind, catalogue open), `2` unrecoverable device-stack failure.

use std::process::ExitCode;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use clap::Parser;
use linkband_server::adapters::{
    BtleplugAdapter, FileSessionRepository, MockAdapter, SqliteDeviceCatalogue, SysinfoMetrics,
};
use linkband_server::config::{Cli, ServerConfig};
use linkband_server::engine::Engine;
use linkband_server::error::AppError;
use linkband_server::http::{self, HttpState};
use linkband_server::monitoring::MonitoringTask;
use linkband_server::ports::{BleAdapter, DeviceCatalogue, SessionRepository};
use linkband_server::state::RecorderRunner;
use linkband_server::ws::{self, WsState};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match ServerConfig::load(&cli.config) {
        Ok(config) => config.apply_cli(&cli),
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::from(1);
        }
    };

    let _log_guard = init_tracing(&config);

    match run(config, cli.mock).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(StartupError::Fatal(e)) => {
            tracing::error!(error = %e, "fatal startup error");
            ExitCode::from(1)
        }
        Err(StartupError::DeviceStack(e)) => {
            tracing::error!(error = %e, "unrecoverable device-stack failure");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(config: &ServerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));

    let file_layer = std::fs::create_dir_all(&config.log_dir).ok().map(|_| {
        let appender = tracing_appender::rolling::daily(&config.log_dir, "linkband-server.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed(),
            guard,
        )
    });

    let stdout_layer = tracing_subscriber::fmt::layer().boxed();

    match file_layer {
        Some((layer, guard)) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .init();
            None
        }
    }
}

enum StartupError {
    Fatal(AppError),
    DeviceStack(AppError),
}

async fn run(config: ServerConfig, mock: bool) -> Result<(), StartupError> {
    std::fs::create_dir_all(&config.export_root)
        .map_err(|e| StartupError::Fatal(AppError::Io(e)))?;

    let adapter: Arc<dyn BleAdapter + Send + Sync> = if mock {
        Arc::new(MockAdapter::new())
    } else {
        Arc::new(
            BtleplugAdapter::new()
                .await
                .map_err(|e| StartupError::DeviceStack(AppError::DeviceScanFailed(e.to_string())))?,
        )
    };

    let catalogue_path = config.export_root.join("devices.sqlite3");
    let device_catalogue: Arc<dyn DeviceCatalogue> = Arc::new(
        SqliteDeviceCatalogue::open(&catalogue_path)
            .map_err(|e| StartupError::Fatal(AppError::StorageFailure(e.to_string())))?,
    );

    let session_repo: Arc<dyn SessionRepository> = Arc::new(
        FileSessionRepository::new(config.export_root.clone())
            .await
            .map_err(|e| StartupError::Fatal(AppError::StorageFailure(e.to_string())))?,
    );

    let recorder = Arc::new(RecorderRunner::new(config.export_root.clone(), session_repo.clone()));

    let engine = Engine::new(config.clone(), adapter, device_catalogue, recorder);

    let client_count = Arc::new(AtomicUsize::new(0));
    let monitoring = Arc::new(MonitoringTask::new(
        engine.clone(),
        engine.bus.clone(),
        Box::new(SysinfoMetrics::new(&config.export_root)),
        client_count.clone(),
    ));
    {
        let monitoring = monitoring.clone();
        let cancel = engine.cancel_token();
        tokio::spawn(async move { monitoring.run(cancel).await });
    }

    let ws_state = WsState {
        engine: engine.clone(),
        client_count,
    };
    let http_state = HttpState {
        engine: engine.clone(),
        session_repo,
        monitoring,
        ws: ws_state.clone(),
        started_at: chrono::Utc::now(),
    };

    let app = http::router(http_state).merge(ws::router(ws_state));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| StartupError::Fatal(AppError::BindFailed(e.to_string())))?;

    tracing::info!(%addr, "listening");

    let shutdown_engine = engine.clone();
    let shutdown_signal = async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown_engine.shutdown().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| StartupError::Fatal(AppError::BindFailed(e.to_string())))?;

    Ok(())
}
