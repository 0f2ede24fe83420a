//! Uploading staged files to a SharePoint document library via Microsoft Graph.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthError, TokenProvider};

/// A destination library folder, as listed under `[sharepoint] folders`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadFolder {
    #[serde(default)]
    pub site_id: String,
    #[serde(default)]
    pub list_id: String,
    #[serde(default)]
    pub remote_path: String,
    #[serde(default)]
    pub sub_folder: String,
}

impl UploadFolder {
    /// All routing fields are present.
    pub fn is_complete(&self) -> bool {
        !self.site_id.is_empty() && !self.list_id.is_empty() && !self.remote_path.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to walk {path}: {message}")]
    Walk { path: PathBuf, message: String },
    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
}

/// Result of uploading one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderReport {
    pub uploaded: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Uploads files one at a time, re-acquiring a token before each.
pub struct Uploader {
    client: reqwest::Client,
    tokens: Arc<TokenProvider>,
    endpoint: String,
    extension: String,
}

impl Uploader {
    pub fn new(tokens: Arc<TokenProvider>) -> Self {
        let endpoint = tokens.settings().graph_endpoint().to_string();
        Self {
            client: reqwest::Client::new(),
            tokens,
            endpoint,
            extension: "csv".to_string(),
        }
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Only files with this extension are picked up by [`Uploader::upload_folder`].
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// `createUploadSession` URL for `file_name` under `folder`.
    pub fn session_url(&self, folder: &UploadFolder, file_name: &str) -> String {
        format!(
            "{}/sites/{}/drives/{}/items/root:/{}:/createUploadSession",
            self.endpoint,
            folder.site_id,
            folder.list_id,
            remote_item_path(&folder.remote_path, file_name)
        )
    }

    /// Upload one file. `Ok(false)` means the provider or the file made the
    /// upload impossible and the reason was logged.
    pub async fn upload_file(&self, path: &Path, folder: &UploadFolder) -> Result<bool, UploadError> {
        let token = self.tokens.acquire_token().await?;

        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => {
                error!(path = %path.display(), "File has no name");
                return Ok(false);
            }
        };
        let data = tokio::fs::read(path).await.map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let size = data.len() as u64;
        if size == 0 {
            error!(path = %path.display(), "File has no size");
            return Ok(false);
        }

        let url = self.session_url(folder, &file_name);
        let body = json!({
            "item": {
                "@microsoft.graph.conflictBehavior": "replace",
                "name": file_name,
            }
        });
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, token.bearer_header())
            .json(&body)
            .send()
            .await?;
        if resp.status() == StatusCode::BAD_REQUEST {
            error!(url = %url, reason = %resp.status(), "Request failed");
            return Ok(false);
        }
        if !resp.status().is_success() {
            return Err(UploadError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        let session: Value = resp.json().await?;
        let Some(upload_url) = session.get("uploadUrl").and_then(Value::as_str) else {
            error!(url = %url, "uploadUrl not in upload session response");
            return Ok(false);
        };

        debug!(file = %file_name, size, "Uploading file bytes");
        let resp = self
            .client
            .put(upload_url)
            .header(CONTENT_LENGTH, size)
            .header(CONTENT_RANGE, format!("bytes 0-{}/{}", size - 1, size))
            .body(data)
            .send()
            .await?;
        if resp.status() == StatusCode::BAD_REQUEST {
            error!(file = %file_name, reason = %resp.status(), "Request failed");
            return Ok(false);
        }
        if !resp.status().is_success() {
            return Err(UploadError::Status {
                url: upload_url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        info!(file = %file_name, remote_path = %folder.remote_path, "Uploaded file");
        Ok(true)
    }

    /// Upload every matching file under `save_folder/sub_folder`.
    pub async fn upload_folder(
        &self,
        save_folder: &Path,
        folder: &UploadFolder,
    ) -> Result<FolderReport, UploadError> {
        let root = save_folder.join(&folder.sub_folder);
        let mut report = FolderReport::default();
        for path in discover_files(&root, &self.extension)? {
            match self.upload_file(&path, folder).await {
                Ok(true) => report.uploaded.push(path),
                Ok(false) => report.skipped.push(path),
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Unable to upload file");
                    return Err(err);
                }
            }
        }
        Ok(report)
    }

    /// Upload all folders in order; an incomplete folder entry ends the pass.
    pub async fn upload_all(
        &self,
        save_folder: &Path,
        folders: &[UploadFolder],
    ) -> Result<FolderReport, UploadError> {
        let mut total = FolderReport::default();
        for folder in folders {
            if !folder.is_complete() {
                warn!(sub_folder = %folder.sub_folder, "Incomplete sharepoint folder entry, stopping upload");
                break;
            }
            let report = self.upload_folder(save_folder, folder).await?;
            total.uploaded.extend(report.uploaded);
            total.skipped.extend(report.skipped);
        }
        Ok(total)
    }
}

/// Files under `root` (recursively) with `extension`, sorted.
///
/// A missing root yields no files.
pub fn discover_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>, UploadError> {
    if !root.exists() {
        debug!(root = %root.display(), "Upload folder does not exist");
        return Ok(Vec::new());
    }
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(true)
        .build();
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|err| UploadError::Walk {
            path: root.to_path_buf(),
            message: err.to_string(),
        })?;
        let is_file = entry.file_type().is_some_and(|kind| kind.is_file());
        let matches = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if is_file && matches {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// `remote_path/file_name` with forward slashes and no duplicate separators.
fn remote_item_path(remote_path: &str, file_name: &str) -> String {
    remote_path
        .split(['/', '\\'])
        .chain(std::iter::once(file_name))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
