//! Put command - upload an artifact

use crate::cli::args::PutArgs;
use crate::client::{BuildCacheService, CacheClient};
use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::key::CacheKey;
use console::style;
use tokio::fs::File;
use tokio::io::AsyncRead;

/// Execute the put command
pub async fn execute(args: PutArgs, config: &Config) -> CacheResult<()> {
    let key = CacheKey::parse(args.key)?;
    let client = CacheClient::from_config(config).await?;

    let mut source: Box<dyn AsyncRead + Unpin + Send> = match &args.file {
        Some(path) => Box::new(File::open(path).await.map_err(|e| {
            CacheError::io(format!("opening {}", path.display()), e)
        })?),
        None => Box::new(tokio::io::stdin()),
    };

    BuildCacheService::store(&client, &key, source.as_mut()).await?;
    client.close().await?;

    eprintln!(
        "{} Stored {} in {}",
        style("✓").green(),
        key,
        client.bucket()
    );
    Ok(())
}
