use anyhow::Result;
use colored::Colorize;

use crate::config::{validate_url, Config};

/// Save the default relay URL
pub fn set_url(url: &str) -> Result<()> {
    validate_url(url)?;

    let mut config = Config::load().unwrap_or_default();
    config.url = Some(url.to_string());
    config.save()?;

    println!("{} Relay URL set to {}", "✓".green().bold(), url);
    println!(
        "  Config saved to {}",
        Config::path()?.display().to_string().dimmed()
    );
    Ok(())
}

/// Show the current configuration
pub fn show() -> Result<()> {
    let config = Config::load()?;
    println!("{}", "Configuration".bold());
    println!("{}", "─".repeat(40));
    println!("  {:<10} {}", "url".dimmed(), config.url());
    println!("  {:<10} {}", "file".dimmed(), Config::path()?.display());
    Ok(())
}
