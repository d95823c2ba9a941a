use anyhow::Result;
use colored::Colorize;
use std::time::Duration;

use crate::client::{Event, RelayClient};

/// Send one raw frame and print the raw replies
pub async fn run(url: &str, frame: &str, wait: Duration) -> Result<()> {
    let mut client = RelayClient::connect(url).await?;
    client.send_raw(frame).await?;
    println!("  {} {}", "→".cyan(), frame);

    loop {
        match client.next_event(Some(wait)).await? {
            Event::Text(reply) => println!("  {} {}", "←".cyan(), reply),
            Event::Closed(_) => {
                println!("  {}", "connection closed by relay".red());
                return Ok(());
            }
            Event::Idle => break,
        }
    }

    client.close().await
}
