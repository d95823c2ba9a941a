//! Tributary Server Entry Point
//!
//! This is the main entry point for the Tributary relay binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tributary_server::cli::config::{Config, LoggingConfig};
use tributary_server::server::Server;

#[derive(Parser)]
#[command(name = "tributary-server")]
#[command(author, version, about = "Tributary - Real-time WebSocket message relay")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "TRIBUTARY_CONFIG")]
    config: Option<PathBuf>,

    /// Port the server listens on
    #[arg(short, long, env = "TRIBUTARY_PORT")]
    port: Option<u16>,

    /// Address the server binds to
    #[arg(long)]
    host: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay (default)
    Start,
    /// Print the effective configuration as TOML
    Config,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => {
            init_logging(&config.logging, cli.verbose)?;
            start_server(config).await?;
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)
                .context("Failed to serialize configuration")?;
            println!("{}", rendered);
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {}", level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    match logging.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.with_file(true).with_line_number(true).try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

async fn start_server(config: Config) -> Result<()> {
    info!("Starting Tributary relay...");
    info!(
        include_sender = config.broadcast.include_sender,
        queue_capacity = config.connection.outbound_queue_capacity,
        write_timeout_ms = config.connection.write_timeout_ms,
        "Configuration loaded"
    );

    let server = Server::new(config).bind().await?;
    server.serve(shutdown_signal()).await?;

    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn show_version() {
    println!("tributary-server {}", env!("CARGO_PKG_VERSION"));
    println!("Real-time WebSocket message relay");
    println!();
    println!("Features:");
    println!("  - Command envelopes over WebSocket");
    println!("  - BROADCAST fan-out to every connected client");
    println!("  - Slow and dead peers pruned without stalling delivery");
}
