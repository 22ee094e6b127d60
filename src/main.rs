//! Doorlog Server
//!
//! Run with: cargo run -- serve
//!
//! # Configuration
//!
//! Read from `--config`, else the first of
//! `~/.config/doorlog/config.toml`, `/etc/doorlog/config.toml`,
//! `./config.toml`. `DOORLOG_*` environment variables override file values;
//! `RUST_LOG` overrides the configured log level.

use anyhow::Context;
use clap::{Parser, Subcommand};
use doorlog::api::{serve, ApiConfig, AppState};
use doorlog::camera::CameraClient;
use doorlog::config::{generate_default_config, Config, LoggingConfig};
use doorlog::store::LogStore;
use doorlog::websocket::ConnectionHub;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "doorlog")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Door access logging backend with live camera events")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server (default)
    Serve {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write a commented default config file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve {
        config: None,
        host: None,
        port: None,
    }) {
        Commands::Serve { config, host, port } => {
            let mut config = match config {
                Some(path) => Config::load_with_env(&path)?,
                None => Config::load_default(),
            };
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }

            init_tracing(&config.logging);
            run_server(config).await
        }
        Commands::InitConfig { output } => write_default_config(&output),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("doorlog={},tower_http={}", logging.level, logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting Doorlog server v{}", env!("CARGO_PKG_VERSION"));

    let offset = config.site.offset();
    tracing::info!(
        database = %config.database.path,
        camera = %config.camera.base_url,
        utc_offset = %offset,
        "Configuration loaded"
    );

    let store = LogStore::open(Path::new(&config.database.path), offset)
        .with_context(|| format!("opening database {}", config.database.path))?;

    let camera = Arc::new(
        CameraClient::new(config.camera.client_config()).context("building camera client")?,
    );

    let hub = Arc::new(ConnectionHub::new(config.hub.hub_config()));
    let dispatcher = Arc::clone(&hub).start_dispatcher();

    let api_config = ApiConfig {
        host: config.api.host.clone(),
        port: config.api.port,
        relay_capacity: config.relay.capacity,
    };

    let state = AppState::new(store, camera, hub, api_config);
    serve(state).await?;

    dispatcher.abort();
    tracing::info!("Doorlog shutdown complete");
    Ok(())
}

fn write_default_config(output: &Path) -> anyhow::Result<()> {
    if output.exists() {
        anyhow::bail!("{} already exists", output.display());
    }

    std::fs::write(output, generate_default_config())
        .with_context(|| format!("writing {}", output.display()))?;

    println!("Wrote default config to {}", output.display());
    Ok(())
}
