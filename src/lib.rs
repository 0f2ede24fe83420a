//! sharesync: pull files from remote hosts and upload them to SharePoint.
//!
//! Uploads authenticate through [`auth::TokenProvider`], which serves tokens
//! from a persisted cache and falls back to an interactive device-code
//! sign-in. The cache is kept in the OS secret store; a plaintext file is
//! used only when the caller explicitly allows it.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sharesync::auth::{TokenProvider, TokenStoreConfig};
//! use sharesync::config::Settings;
//! use sharesync::sync::{SyncJob, SyncSteps};
//!
//! # async fn example() -> sharesync::error::Result<()> {
//! let settings = Settings::load(".setup.toml")?;
//! let store = TokenStoreConfig::new(TokenStoreConfig::default_location(), false);
//! let tokens = TokenProvider::new(settings.auth.clone(), &store)?;
//! let report = SyncJob::new(settings)
//!     .with_tokens(Arc::new(tokens))
//!     .run(SyncSteps::ALL)
//!     .await?;
//! println!("uploaded {}", report.uploads.uploaded.len());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod remote;
pub mod sync;
pub mod upload;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "cli")]
pub mod logging;
