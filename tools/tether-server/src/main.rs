//! Tether rendezvous server
//!
//! Accepts signaling connections over WebSocket and pairs each one with a
//! peer-engine session. Runs with a loopback demo engine; production
//! deployments embed the library and supply their own engine.

mod engine;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use tether_core::DEFAULT_SIGNALING_PORT;
use tether_signaling::{SignalingConfig, SignalingServer};

use crate::engine::LoopbackEngine;

#[derive(Parser)]
#[command(name = "tether-server")]
#[command(about = "Tether rendezvous server")]
#[command(version)]
struct Cli {
    /// Listen address, e.g. 0.0.0.0:7440
    #[arg(short, long)]
    listen: Option<String>,

    /// Server name used in logs
    #[arg(short, long)]
    name: Option<String>,

    /// Maximum concurrent sessions
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Keepalive interval in seconds
    #[arg(long)]
    keepalive_secs: Option<u64>,

    /// Config file path (TOML); command-line flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    listen: Option<String>,
    name: Option<String>,
    max_sessions: Option<usize>,
    keepalive_secs: Option<u64>,
}

fn load_file_config(path: &PathBuf) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let file = match &cli.config {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };

    let listen = cli
        .listen
        .or(file.listen)
        .unwrap_or_else(|| format!("0.0.0.0:{DEFAULT_SIGNALING_PORT}"));

    let defaults = SignalingConfig::default();
    let config = SignalingConfig {
        name: cli.name.or(file.name).unwrap_or(defaults.name),
        max_sessions: cli
            .max_sessions
            .or(file.max_sessions)
            .unwrap_or(defaults.max_sessions),
        keepalive_interval: cli
            .keepalive_secs
            .or(file.keepalive_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.keepalive_interval),
        ..defaults
    };

    tracing::info!("starting {}", config.name);
    tracing::info!("listening on: {}", listen);

    let engine = Arc::new(LoopbackEngine::new());
    let server = SignalingServer::new(config, engine)?;

    tokio::select! {
        result = server.serve_websocket(&listen) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down ({} active sessions)", server.session_count());
            server.stop();
        }
    }

    Ok(())
}
