//! Command-line interface for sharesync.

pub mod auth;
pub mod sync;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::auth::TokenStoreConfig;
use crate::config::DEFAULT_SETUP_FILE;

/// Pull files from remote hosts and upload them to SharePoint.
#[derive(Parser, Debug)]
#[command(name = "sharesync", version, about = "Remote file pull and SharePoint upload")]
pub struct Cli {
    /// Setup file with [sharepoint], [local] and [remote] tables
    #[arg(long, global = true, env = "SHARESYNC_SETUP", default_value = DEFAULT_SETUP_FILE)]
    pub setup: PathBuf,

    /// Token cache location
    #[arg(long, global = true, env = "SHARESYNC_CACHE")]
    pub cache: Option<PathBuf>,

    /// Store the token cache unencrypted when the OS secret store is unavailable
    #[arg(long, global = true, env = "SHARESYNC_ALLOW_PLAINTEXT")]
    pub allow_plaintext: bool,

    /// Directory for per-run log files
    #[arg(long, global = true, env = "SHARESYNC_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Acquire a token, signing in with a device code if needed
    Login,
    /// Show the token cache backend and cached accounts
    Status,
    /// Remove the local token cache
    Logout,
    /// Pull files from the remote targets
    Pull,
    /// Upload staged files to SharePoint
    Upload,
    /// Pull, then upload
    Run,
}

impl Cli {
    pub fn store_config(&self) -> TokenStoreConfig {
        let location = self
            .cache
            .clone()
            .unwrap_or_else(TokenStoreConfig::default_location);
        TokenStoreConfig::new(location, self.allow_plaintext)
    }
}
