//! collabwrite server
//!
//! Run with: cargo run -- serve
//!
//! # Configuration
//!
//! Settings come from a TOML file (see `collabwrite config`), searched in
//! the user config dir, `/etc/collabwrite/` and the working directory.
//!
//! Environment variables override the file:
//! - `COLLABWRITE_HOST`: Host to bind to (default: 0.0.0.0)
//! - `COLLABWRITE_PORT`: Port to listen on (default: 8080)
//! - `COLLABWRITE_LOG_LEVEL`: Log level (default: info)
//! - `COLLABWRITE_LOG_FORMAT`: `pretty` or `json` (default: pretty)
//! - `RUST_LOG`: Full filter directive, takes precedence over the level

use clap::{Parser, Subcommand};
use collabwrite::api::{serve, AppState};
use collabwrite::config::{generate_default_config, Config, LoggingConfig};
use collabwrite::websocket::Hub;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "collabwrite")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time collaborative text editing server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server
    Serve {
        /// Path to a config file (default: search the standard locations)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write a default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, host, port } => {
            let (mut config, source) = match config {
                Some(path) => {
                    let config = Config::load_with_env(&path)?;
                    (config, Some(path))
                }
                None => Config::load_default(),
            };
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            init_tracing(&config.logging)?;

            tracing::info!("Starting collabwrite v{}", env!("CARGO_PKG_VERSION"));
            match source {
                Some(path) => tracing::info!("Loaded configuration from {}", path.display()),
                None => tracing::info!("No config file found, using defaults"),
            }

            run_server(config).await?;
        }
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)?;
                    println!("Wrote default configuration to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let (hub, hub_task) = Hub::spawn(&config.hub);
    tracing::info!(
        command_capacity = config.hub.command_capacity,
        "Hub started"
    );

    let state = AppState::new(hub, config.connection.clone());
    serve(state, &config.server).await?;

    // Open sockets still hold hub handles; stop the actor directly.
    hub_task.abort();
    tracing::info!("collabwrite stopped");

    Ok(())
}

/// Initialize tracing from the logging section
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("collabwrite={},tower_http=info", logging.level))
    });

    let file = match &logging.file {
        Some(path) => Some(Arc::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if logging.is_json() {
        registry
            .with(fmt::layer().json())
            .with(file.map(|f| fmt::layer().json().with_ansi(false).with_writer(f)))
            .init();
    } else {
        registry
            .with(fmt::layer())
            .with(file.map(|f| fmt::layer().with_ansi(false).with_writer(f)))
            .init();
    }

    Ok(())
}
