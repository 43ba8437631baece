//! Get command - download an artifact

use crate::cli::args::GetArgs;
use crate::client::CacheClient;
use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::key::CacheKey;
use console::style;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Execute the get command
pub async fn execute(args: GetArgs, config: &Config) -> CacheResult<()> {
    let key = CacheKey::parse(args.key)?;
    let client = CacheClient::from_config(config).await?;

    let entry = client.load(&key).await?;
    client.close().await?;

    let Some(entry) = entry else {
        return Err(CacheError::User(format!(
            "No entry for {} in {}",
            key,
            client.bucket()
        )));
    };
    debug!("Entry {} created {}", key, entry.created_at);

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &entry.payload)
                .await
                .map_err(|e| CacheError::io(format!("writing {}", path.display()), e))?;
            eprintln!(
                "{} Wrote {} bytes to {}",
                style("✓").green(),
                entry.payload.len(),
                path.display()
            );
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(&entry.payload)
                .await
                .map_err(|e| CacheError::io("writing to stdout", e))?;
            stdout
                .flush()
                .await
                .map_err(|e| CacheError::io("flushing stdout", e))?;
        }
    }

    Ok(())
}
