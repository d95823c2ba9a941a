use anyhow::Result;
use chrono::Local;
use colored::Colorize;

use crate::client::{display_text, Event, RelayClient};

/// Print every message the relay delivers until it closes the connection
pub async fn run(url: &str, raw: bool) -> Result<()> {
    let mut client = RelayClient::connect(url).await?;
    println!("{} Listening on {} (Ctrl-C to stop)", "●".green(), url.dimmed());

    loop {
        tokio::select! {
            event = client.next_event(None) => match event? {
                Event::Text(frame) => {
                    let ts = Local::now().format("%H:%M:%S");
                    let text = if raw { frame } else { display_text(&frame) };
                    println!("{} {}", ts.to_string().dimmed(), text);
                }
                Event::Closed(_) => {
                    println!("{}", "Relay closed the connection.".yellow());
                    return Ok(());
                }
                Event::Idle => {}
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.close().await
}
