use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::AuthError;

/// Token payload returned to callers of [`TokenProvider::acquire_token`].
///
/// Always carries a non-empty `access_token`; anything else is rejected by
/// [`TokenResponse::from_payload`] before it reaches a caller.
///
/// # Example
/// ```no_run
/// use sharesync::auth::TokenResponse;
///
/// let payload = serde_json::json!({"access_token": "eyJ0", "expires_in": 3599});
/// let token = TokenResponse::from_payload(payload)?;
/// assert_eq!(token.bearer_header(), "Bearer eyJ0");
/// # Ok::<(), sharesync::auth::AuthError>(())
/// ```
///
/// [`TokenProvider::acquire_token`]: super::TokenProvider::acquire_token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenResponse {
    /// Validate a raw provider payload.
    ///
    /// Success requires an object with a non-empty string `access_token`.
    /// Any other shape becomes [`AuthError::TokenAcquisitionFailed`] carrying
    /// the payload untouched.
    pub fn from_payload(payload: Value) -> Result<Self, AuthError> {
        let has_token = payload
            .get("access_token")
            .and_then(Value::as_str)
            .is_some_and(|token| !token.is_empty());
        if !has_token {
            return Err(AuthError::TokenAcquisitionFailed { payload });
        }
        serde_json::from_value(payload.clone())
            .map_err(|_| AuthError::TokenAcquisitionFailed { payload })
    }

    /// `Authorization` header value for downstream requests.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Granted scopes, split on whitespace.
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
