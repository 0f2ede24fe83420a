//! Setup-file loading.
//!
//! The setup file is TOML with three tables:
//!
//! ```toml
//! [sharepoint]
//! authority = "https://login.microsoftonline.com/contoso.onmicrosoft.com"
//! client = "00000000-0000-0000-0000-000000000000"
//! scopes = "Sites.ReadWrite.All"
//! endpoint = "https://graph.microsoft.com/v1.0"
//! folders = [
//!     { site_id = "site", list_id = "drive", remote_path = "Shared/Logs", sub_folder = "plc01" },
//! ]
//!
//! [local]
//! save_folder = "./RemoteFiles/"
//!
//! [remote]
//! targets = [{ username = "pi", ip = "10.0.0.12", location = "/var/log/csv/" }]
//! ```

pub mod auth;

pub use auth::{AuthSettings, DEFAULT_GRAPH_ENDPOINT};

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::remote::RemoteTarget;
use crate::upload::UploadFolder;

/// Default setup file name, relative to the working directory.
pub const DEFAULT_SETUP_FILE: &str = ".setup.toml";

/// Default staging folder for pulled files.
pub const DEFAULT_SAVE_FOLDER: &str = "./RemoteFiles/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Unable to load remote targets from settings")]
    MissingTargets,
    #[error("Unable to load sharepoint folders from settings")]
    MissingFolders,
}

/// Everything read from the setup file.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub auth: AuthSettings,
    pub save_folder: PathBuf,
    pub targets: Option<Vec<RemoteTarget>>,
    pub folders: Option<Vec<UploadFolder>>,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: SetupFile = toml::from_str(raw)?;

        let (auth, folders) = match file.sharepoint {
            Some(table) => (AuthSettings::from(table.auth), table.folders),
            None => {
                warn!("Unable to load sharepoint settings");
                (AuthSettings::default(), None)
            }
        };

        let save_folder = match file.local.and_then(|local| local.save_folder) {
            Some(folder) => PathBuf::from(folder),
            None => {
                warn!("Unable to load save folder from settings, using default");
                PathBuf::from(DEFAULT_SAVE_FOLDER)
            }
        };

        Ok(Self {
            auth,
            save_folder,
            targets: file.remote.and_then(|remote| remote.targets),
            folders,
        })
    }

    /// Remote targets; required by the pull step.
    pub fn targets(&self) -> Result<&[RemoteTarget], ConfigError> {
        self.targets.as_deref().ok_or(ConfigError::MissingTargets)
    }

    /// Upload folders; required by the upload step.
    pub fn folders(&self) -> Result<&[UploadFolder], ConfigError> {
        self.folders.as_deref().ok_or(ConfigError::MissingFolders)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SetupFile {
    sharepoint: Option<SharepointTable>,
    local: Option<LocalTable>,
    remote: Option<RemoteTable>,
}

#[derive(Debug, Default, Deserialize)]
struct SharepointTable {
    #[serde(flatten)]
    auth: auth::SharepointAuthTable,
    folders: Option<Vec<UploadFolder>>,
}

#[derive(Debug, Default, Deserialize)]
struct LocalTable {
    save_folder: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RemoteTable {
    targets: Option<Vec<RemoteTarget>>,
}
