use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;

mod client;
mod commands;
mod config;

#[derive(Parser)]
#[command(name = "tributary", about = "Tributary CLI - Talk to a Tributary relay")]
#[command(version, propagate_version = true)]
struct Cli {
    /// Relay WebSocket URL (default: from ~/.tributary/config.toml)
    #[arg(long, global = true, env = "TRIBUTARY_URL")]
    url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Broadcast a message to every connected client
    Broadcast {
        /// Message text
        message: String,

        /// Do not echo the message back to this client
        #[arg(long)]
        exclude_sender: bool,

        /// Seconds to wait for replies
        #[arg(short, long, default_value = "2")]
        wait: u64,
    },

    /// Print messages as they are relayed
    Listen {
        /// Print raw frames instead of message text
        #[arg(long)]
        raw: bool,
    },

    /// Send one raw frame and print the replies
    Send {
        /// Frame contents, usually a JSON envelope
        frame: String,

        /// Seconds to wait for replies
        #[arg(short, long, default_value = "2")]
        wait: u64,
    },

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set the default relay URL
    SetUrl { url: String },
    /// Show the current configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    }

    let url = match cli.url {
        Some(url) => url,
        None => config::Config::load()?.url().to_string(),
    };

    match cli.command {
        Commands::Broadcast {
            message,
            exclude_sender,
            wait,
        } => {
            config::validate_url(&url)?;
            commands::broadcast::run(&url, &message, exclude_sender, Duration::from_secs(wait)).await
        }
        Commands::Listen { raw } => {
            config::validate_url(&url)?;
            commands::listen::run(&url, raw).await
        }
        Commands::Send { frame, wait } => {
            config::validate_url(&url)?;
            commands::send::run(&url, &frame, Duration::from_secs(wait)).await
        }
        Commands::Config { action } => match action {
            ConfigAction::SetUrl { url } => commands::config::set_url(&url),
            ConfigAction::Show => commands::config::show(),
        },
    }
}
