//! Identity-provider settings.

use serde::Deserialize;
use tracing::warn;

/// Default Microsoft Graph base URL used when `endpoint` is left empty.
pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/v1.0";

/// Settings the token provider and uploader need. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSettings {
    pub authority: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub endpoint: String,
}

impl AuthSettings {
    /// Graph base URL without a trailing slash.
    pub fn graph_endpoint(&self) -> &str {
        let endpoint = self.endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            DEFAULT_GRAPH_ENDPOINT
        } else {
            endpoint
        }
    }
}

/// `[sharepoint]` keys as written in the setup file.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SharepointAuthTable {
    pub authority: Option<String>,
    pub client: Option<String>,
    pub scopes: Option<String>,
    pub endpoint: Option<String>,
}

impl From<SharepointAuthTable> for AuthSettings {
    /// Missing keys become empty values; the provider rejects them later.
    fn from(table: SharepointAuthTable) -> Self {
        let field = |value: Option<String>, key: &str| {
            value.unwrap_or_else(|| {
                warn!(key, "Missing sharepoint setting, using empty value");
                String::new()
            })
        };
        let scopes = field(table.scopes, "scopes")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Self {
            authority: field(table.authority, "authority"),
            client_id: field(table.client, "client"),
            scopes,
            endpoint: field(table.endpoint, "endpoint"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_split_on_whitespace() {
        let settings = AuthSettings::from(SharepointAuthTable {
            authority: Some("https://login.microsoftonline.com/common".to_string()),
            client: Some("cid".to_string()),
            scopes: Some("Sites.ReadWrite.All   Files.ReadWrite\tUser.Read".to_string()),
            endpoint: None,
        });
        assert_eq!(
            settings.scopes,
            vec!["Sites.ReadWrite.All", "Files.ReadWrite", "User.Read"]
        );
        assert_eq!(settings.endpoint, "");
    }

    #[test]
    fn missing_keys_become_empty() {
        let settings = AuthSettings::from(SharepointAuthTable::default());
        assert_eq!(settings, AuthSettings::default());
    }

    #[test]
    fn graph_endpoint_defaults_and_trims() {
        let mut settings = AuthSettings::default();
        assert_eq!(settings.graph_endpoint(), DEFAULT_GRAPH_ENDPOINT);
        settings.endpoint = "https://graph.microsoft.com/beta/".to_string();
        assert_eq!(settings.graph_endpoint(), "https://graph.microsoft.com/beta");
    }
}
