//! bucket-cache - remote build-artifact cache
//!
//! CLI entry point that dispatches to subcommands.

use bucket_cache::cli::{Cli, Commands};
use bucket_cache::config::{ConfigManager, LogFormat};
use bucket_cache::error::CacheResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    // Hash doesn't need config loading
    if let Commands::Hash(args) = cli.command {
        init_logging(cli.verbose, cli.log_format.unwrap_or_default());
        return bucket_cache::cli::commands::hash(args).await;
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;
    cli.apply_overrides(&mut config);
    init_logging(cli.verbose, config.general.log_format);

    match cli.command {
        Commands::Hash(_) => unreachable!("Hash handled above"),
        Commands::Put(args) => bucket_cache::cli::commands::put(args, &config).await,
        Commands::Get(args) => bucket_cache::cli::commands::get(args, &config).await,
        Commands::Check => bucket_cache::cli::commands::check(&config).await,
        Commands::Config(args) => {
            bucket_cache::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, format: LogFormat) {
    let filter = match verbose {
        0 => EnvFilter::new("bucket_cache=warn"),
        1 => EnvFilter::new("bucket_cache=info"),
        _ => EnvFilter::new("bucket_cache=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.without_time().init(),
    }
}
