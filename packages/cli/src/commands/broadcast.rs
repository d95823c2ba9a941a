use anyhow::Result;
use colored::Colorize;
use std::time::Duration;

use crate::client::{display_text, Event, RelayClient};

/// Broadcast a message and show what comes back until the relay goes quiet
pub async fn run(url: &str, message: &str, exclude_sender: bool, wait: Duration) -> Result<()> {
    let mut client = RelayClient::connect(url).await?;
    client.broadcast(message, exclude_sender).await?;
    println!("{} Broadcast sent to {}", "✓".green().bold(), url.dimmed());

    loop {
        match client.next_event(Some(wait)).await? {
            Event::Text(frame) => println!("  {} {}", "←".cyan(), display_text(&frame)),
            Event::Closed(reason) => {
                println!(
                    "{} Relay closed the connection{}",
                    "✗".red().bold(),
                    reason
                        .filter(|r| !r.is_empty())
                        .map(|r| format!(": {}", r))
                        .unwrap_or_default()
                );
                return Ok(());
            }
            Event::Idle => break,
        }
    }

    client.close().await
}
