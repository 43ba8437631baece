//! Check command - verify the bucket is reachable with current credentials

use crate::client::CacheClient;
use crate::config::{Config, RefreshMode};
use crate::error::CacheResult;
use console::style;

/// Execute the check command
pub async fn execute(config: &Config) -> CacheResult<()> {
    let client = CacheClient::from_config(config).await?;

    println!(
        "{} Connected to bucket {}",
        style("✓").green(),
        style(client.bucket()).bold()
    );

    match config.bucket.refresh_after() {
        Some(interval) => {
            let mode = match config.bucket.refresh_mode {
                RefreshMode::Blocking => "blocking",
                RefreshMode::Background => "background",
            };
            println!(
                "  Refresh: entries older than {}s ({})",
                interval.as_secs(),
                mode
            );
        }
        None => println!("  Refresh: {}", style("disabled").dim()),
    }

    client.close().await
}
