//! Hash command - print the content key for a file

use crate::cli::args::HashArgs;
use crate::error::{CacheError, CacheResult};
use crate::key::CacheKey;

/// Execute the hash command
pub async fn execute(args: HashArgs) -> CacheResult<()> {
    let content = tokio::fs::read(&args.file)
        .await
        .map_err(|e| CacheError::io(format!("reading {}", args.file.display()), e))?;

    println!("{}", CacheKey::digest(&content));
    Ok(())
}
