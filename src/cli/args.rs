//! CLI argument definitions using clap derive

use crate::config::{Config, LogFormat};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// bucket-cache - remote build-artifact cache
///
/// Stores and retrieves build outputs by content key in a cloud storage
/// bucket, refreshing entries that are still in use.
#[derive(Parser, Debug)]
#[command(name = "bucket-cache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log output format (overrides config)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BUCKET_CACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bucket name (overrides config)
    #[arg(short, long, global = true, env = "BUCKET_CACHE_BUCKET")]
    pub bucket: Option<String>,

    /// Refresh entries older than this many seconds on read (0 disables)
    #[arg(long, global = true, env = "BUCKET_CACHE_REFRESH_AFTER_SECS")]
    pub refresh_after: Option<u64>,
}

impl Cli {
    /// Apply command-line settings on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(bucket) = &self.bucket {
            config.bucket.name = bucket.clone();
        }
        if let Some(secs) = self.refresh_after {
            config.bucket.refresh_after_secs = secs;
        }
        if let Some(format) = self.log_format {
            config.general.log_format = format;
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store an artifact under a key
    Put(PutArgs),

    /// Fetch the artifact stored under a key
    Get(GetArgs),

    /// Print the content key for a file
    Hash(HashArgs),

    /// Connect to the configured bucket and report
    Check,

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the put command
#[derive(Parser, Debug)]
pub struct PutArgs {
    /// Cache key (object name)
    pub key: String,

    /// File to upload (reads stdin when omitted)
    pub file: Option<PathBuf>,
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Cache key (object name)
    pub key: String,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the hash command
#[derive(Parser, Debug)]
pub struct HashArgs {
    /// File to fingerprint
    pub file: PathBuf,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
