//! `linkband-cli` — a thin operator CLI for `linkband-server`'s HTTP control
//! plane (§4.7). Every subcommand is a single request; this binary holds no
//! BLE or recording logic of its own.

use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use serde_json::Value;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// LinkBand operator CLI.
#[derive(Parser, Debug)]
#[command(name = "linkband-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the running server.
    #[arg(long, default_value = "http://127.0.0.1:8121")]
    server: String,

    /// Enable verbose debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan for nearby headbands.
    Scan {
        /// Scan duration in seconds.
        #[arg(long, default_value_t = 5)]
        duration: u64,
    },
    /// Register a discovered headband.
    Register {
        /// Advertised BLE address.
        address: String,
        /// Display name to store in the catalogue.
        name: String,
    },
    /// List registered headbands.
    Devices,
    /// Connect to a registered headband and begin streaming.
    Connect {
        /// BLE address to connect to.
        address: String,
    },
    /// Disconnect the currently connected headband.
    Disconnect,
    /// Show the current connection and streaming status.
    Status,
    /// Start a recording session.
    Record {
        /// Optional session name; a timestamp-based name is generated otherwise.
        name: Option<String>,
        /// `json` (default) or `csv`.
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Stop the active recording session.
    Stop,
    /// List recorded sessions.
    Sessions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    let client = reqwest::Client::new();

    match cli.command {
        Commands::Scan { duration } => scan(&client, &cli.server, duration).await?,
        Commands::Register { address, name } => register(&client, &cli.server, &address, &name).await?,
        Commands::Devices => devices(&client, &cli.server).await?,
        Commands::Connect { address } => connect(&client, &cli.server, &address).await?,
        Commands::Disconnect => disconnect(&client, &cli.server).await?,
        Commands::Status => status(&client, &cli.server).await?,
        Commands::Record { name, format } => record(&client, &cli.server, name, &format).await?,
        Commands::Stop => stop(&client, &cli.server).await?,
        Commands::Sessions => sessions(&client, &cli.server).await?,
    }

    Ok(())
}

async fn get_json(client: &reqwest::Client, url: String) -> anyhow::Result<Value> {
    info!(url, "GET");
    Ok(client.get(url).send().await?.json().await?)
}

async fn post_json(client: &reqwest::Client, url: String, body: Value) -> anyhow::Result<Value> {
    info!(url, "POST");
    let response = client.post(url).json(&body).send().await?;
    if !response.status().is_success() {
        warn!(status = %response.status(), "request failed");
    }
    Ok(response.json().await?)
}

async fn scan(client: &reqwest::Client, server: &str, duration: u64) -> anyhow::Result<()> {
    println!("{}", format!("scanning for {duration}s...").dimmed());
    let body = get_json(client, format!("{server}/device/scan?duration={duration}")).await?;
    let devices = body["devices"].as_array().cloned().unwrap_or_default();

    if devices.is_empty() {
        println!("{}", "no devices found".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Address", "Name", "RSSI", "Connected"]);
    for device in devices {
        table.add_row(vec![
            device["address"].as_str().unwrap_or_default().to_string(),
            device["name"].as_str().unwrap_or("(unknown)").to_string(),
            device["rssi"].to_string(),
            device["is_connected"].as_bool().unwrap_or(false).to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn register(client: &reqwest::Client, server: &str, address: &str, name: &str) -> anyhow::Result<()> {
    let body = post_json(
        client,
        format!("{server}/device/register_device"),
        serde_json::json!({ "name": name, "address": address }),
    )
    .await?;
    print_outcome(&body, "registered device");
    Ok(())
}

async fn devices(client: &reqwest::Client, server: &str) -> anyhow::Result<()> {
    let body = get_json(client, format!("{server}/device/list")).await?;
    let devices = body["data"].as_array().cloned().unwrap_or_default();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["ID", "Name", "Registered"]);
    for device in devices {
        table.add_row(vec![
            device["id"].as_str().unwrap_or_default().to_string(),
            device["name"].as_str().unwrap_or_default().to_string(),
            device["registered"].as_bool().unwrap_or(false).to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn connect(client: &reqwest::Client, server: &str, address: &str) -> anyhow::Result<()> {
    let body = post_json(
        client,
        format!("{server}/device/connect"),
        serde_json::json!({ "address": address }),
    )
    .await?;
    print_outcome(&body, &format!("connected to {address}"));
    Ok(())
}

async fn disconnect(client: &reqwest::Client, server: &str) -> anyhow::Result<()> {
    let body = post_json(client, format!("{server}/device/disconnect"), serde_json::json!({})).await?;
    print_outcome(&body, "disconnected");
    Ok(())
}

async fn status(client: &reqwest::Client, server: &str) -> anyhow::Result<()> {
    let device = get_json(client, format!("{server}/device/status")).await?;
    let stream = get_json(client, format!("{server}/stream/status")).await?;

    println!("{}", "device".bold());
    println!("  {device}");
    println!("{}", "stream".bold());
    println!("  {stream}");
    Ok(())
}

async fn record(client: &reqwest::Client, server: &str, name: Option<String>, format: &str) -> anyhow::Result<()> {
    let body = post_json(
        client,
        format!("{server}/data/start-recording"),
        serde_json::json!({ "session_name": name, "settings": { "data_format": format } }),
    )
    .await?;
    println!("{}", "recording started".green());
    println!("  {body}");
    Ok(())
}

async fn stop(client: &reqwest::Client, server: &str) -> anyhow::Result<()> {
    let body = post_json(client, format!("{server}/data/stop-recording"), serde_json::json!({})).await?;
    println!("{}", "recording stopped".green());
    println!("  {body}");
    Ok(())
}

async fn sessions(client: &reqwest::Client, server: &str) -> anyhow::Result<()> {
    let body = get_json(client, format!("{server}/data/sessions")).await?;
    let sessions = body["sessions"].as_array().cloned().unwrap_or_default();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Name", "Status", "Started", "Ended"]);
    for session in sessions {
        table.add_row(vec![
            session["name"].as_str().unwrap_or_default().to_string(),
            session["status"].as_str().unwrap_or_default().to_string(),
            session["started_at"].as_str().unwrap_or_default().to_string(),
            session["ended_at"].as_str().unwrap_or("-").to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn print_outcome(body: &Value, verb: &str) {
    let success = body["success"].as_bool().unwrap_or(false);
    if success {
        println!("{} {verb}", "✓".green());
    } else {
        let message = body["message"].as_str().unwrap_or("request failed");
        println!("{} {message}", "✗".red());
    }
}
