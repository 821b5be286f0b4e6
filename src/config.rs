//! Layered server configuration.
//!
//! Precedence, lowest to highest: built-in defaults, a TOML file (default
//! path under the OS config directory, override with `--config`), then CLI
//! flags. Ports and the export root default to the values pinned in §6.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Default HTTP/WebSocket port (§6: "a conforming implementation must
/// expose at least `/ws` on 8121").
pub const DEFAULT_HTTP_PORT: u16 = 8121;

/// Secondary WebSocket-only port permitted by §6.
pub const DEFAULT_WS_PORT: u16 = 18765;

/// File-backed configuration, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP + WebSocket listen port.
    pub http_port: u16,
    /// Secondary WebSocket-only port.
    pub ws_port: u16,
    /// Root directory recorded sessions are written under.
    pub export_root: PathBuf,
    /// Optional BLE device-name substring filter applied during scan.
    pub device_name_filter: Option<String>,
    /// `RUST_LOG`-style filter directive used when no environment override is set.
    pub log_filter: String,
    /// Directory rolling log files are written to (in addition to stdout).
    pub log_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            ws_port: DEFAULT_WS_PORT,
            export_root: default_export_root(),
            device_name_filter: None,
            log_filter: "info".to_string(),
            log_dir: default_export_root()
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(std::env::temp_dir)
                .join("logs"),
        }
    }
}

/// OS-standard export root per §4.6:
/// `%APPDATA%/LinkBand/Exports`, `~/Library/Application Support/LinkBand/Exports`,
/// `~/.config/LinkBand/Exports`.
pub fn default_export_root() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("LinkBand")
            .join("Exports")
    }
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("Library")
            .join("Application Support")
            .join("LinkBand")
            .join("Exports")
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".config")
            .join("LinkBand")
            .join("Exports")
    }
}

impl ServerConfig {
    /// Load from `path` if it exists, falling back to defaults otherwise.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| AppError::StorageFailure(format!("invalid config at {path:?}: {e}")))
    }

    /// Apply CLI overrides on top of a loaded configuration.
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(port) = cli.http_port {
            self.http_port = port;
        }
        if let Some(port) = cli.ws_port {
            self.ws_port = port;
        }
        if let Some(root) = &cli.export_root {
            self.export_root = root.clone();
        }
        if let Some(filter) = &cli.device_name_filter {
            self.device_name_filter = Some(filter.clone());
        }
        self
    }
}

/// CLI flags for the `linkband-server` binary.
#[derive(Debug, Parser)]
#[command(name = "linkband-server", about = "Local biosignal acquisition server")]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, default_value = "linkband.toml")]
    pub config: PathBuf,

    /// Override the HTTP/WebSocket port.
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Override the secondary WebSocket-only port.
    #[arg(long)]
    pub ws_port: Option<u16>,

    /// Override the session export root directory.
    #[arg(long)]
    pub export_root: Option<PathBuf>,

    /// Only connect to devices whose advertised name contains this substring.
    #[arg(long)]
    pub device_name_filter: Option<String>,

    /// Use the in-process mock BLE adapter instead of real hardware.
    #[arg(long)]
    pub mock: bool,
}
