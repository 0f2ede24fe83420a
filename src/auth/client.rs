use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use super::cache::{expires_after, RESERVED_SCOPES};
use super::device_code::{DeviceCodePoll, DeviceCodeSession};
use super::error::AuthError;
use super::token::TokenResponse;
use crate::config::AuthSettings;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// RFC 8628 §3.5: each `slow_down` adds five seconds to the interval.
const SLOW_DOWN_STEP_SECS: u64 = 5;

/// HTTP client for the identity provider's v2.0 endpoints.
///
/// # Example
/// ```no_run
/// use sharesync::auth::IdentityClient;
/// use sharesync::config::AuthSettings;
///
/// let settings = AuthSettings {
///     authority: "https://login.microsoftonline.com/contoso.onmicrosoft.com".to_string(),
///     client_id: "00000000-0000-0000-0000-000000000000".to_string(),
///     scopes: vec!["Sites.ReadWrite.All".to_string()],
///     endpoint: String::new(),
/// };
/// let client = IdentityClient::new(&settings);
/// assert!(client.token_url().ends_with("/oauth2/v2.0/token"));
/// ```
#[derive(Debug, Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    client_id: String,
    device_code_url: String,
    token_url: String,
}

impl IdentityClient {
    pub fn new(settings: &AuthSettings) -> Self {
        let authority = settings.authority.trim_end_matches('/');
        Self {
            client: reqwest::Client::new(),
            client_id: settings.client_id.clone(),
            device_code_url: format!("{authority}/oauth2/v2.0/devicecode"),
            token_url: format!("{authority}/oauth2/v2.0/token"),
        }
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn device_code_url(&self) -> &str {
        &self.device_code_url
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Request a device code for `scopes`.
    ///
    /// A response without `user_code` (provider error payloads included) is
    /// [`AuthError::DeviceFlowInitiationFailed`].
    pub async fn initiate_device_flow(
        &self,
        scopes: &[String],
    ) -> Result<DeviceCodeSession, AuthError> {
        let scope = request_scope(scopes);
        let resp = self
            .client
            .post(&self.device_code_url)
            .header("Accept", "application/json")
            .header("client-request-id", Uuid::new_v4().to_string())
            .form(&[("client_id", self.client_id.as_str()), ("scope", scope.as_str())])
            .send()
            .await?;
        let payload = read_payload(resp).await?;

        if payload.get("user_code").and_then(Value::as_str).is_none() {
            error!(payload = %payload, "Failed to create device flow");
            return Err(AuthError::DeviceFlowInitiationFailed { payload });
        }
        let device: DeviceCodeResponse = serde_json::from_value(payload.clone()).map_err(|err| {
            error!(payload = %payload, error = %err, "Malformed device flow response");
            AuthError::DeviceFlowInitiationFailed {
                payload: payload.clone(),
            }
        })?;

        debug!(
            verification_url = %device.verification_uri,
            expires_in = device.expires_in,
            interval = device.interval,
            "Device flow started"
        );
        Ok(DeviceCodeSession {
            verification_url: device.verification_uri,
            user_code: device.user_code,
            device_code: device.device_code,
            interval_secs: device.interval,
            expires_at: expires_after(Utc::now(), device.expires_in),
            message: device.message,
        })
    }

    /// Exchange the device code once.
    pub async fn poll_device_code(
        &self,
        session: &DeviceCodeSession,
    ) -> Result<DeviceCodePoll, AuthError> {
        if Utc::now() >= session.expires_at {
            return Ok(DeviceCodePoll::Expired);
        }
        let resp = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .header("client-request-id", Uuid::new_v4().to_string())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("device_code", session.device_code.as_str()),
                ("grant_type", DEVICE_CODE_GRANT),
                ("client_info", "1"),
            ])
            .send()
            .await?;
        let payload = read_payload(resp).await?;

        if payload.get("access_token").is_some() {
            let token = TokenResponse::from_payload(payload)?;
            return Ok(DeviceCodePoll::Authorized { token });
        }
        match payload.get("error").and_then(Value::as_str) {
            Some("authorization_pending") => Ok(DeviceCodePoll::Pending {
                interval_secs: session.interval_secs,
            }),
            Some("slow_down") => Ok(DeviceCodePoll::SlowDown {
                interval_secs: session.interval_secs + SLOW_DOWN_STEP_SECS,
            }),
            Some("expired_token" | "code_expired") => Ok(DeviceCodePoll::Expired),
            Some("access_denied" | "authorization_declined") => Ok(DeviceCodePoll::AccessDenied),
            _ => Err(AuthError::TokenAcquisitionFailed { payload }),
        }
    }

    /// Redeem a refresh token; returns the raw payload for the caller to validate.
    pub async fn redeem_refresh_token(
        &self,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<Value, AuthError> {
        let scope = request_scope(scopes);
        let resp = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .header("client-request-id", Uuid::new_v4().to_string())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("scope", scope.as_str()),
                ("client_info", "1"),
            ])
            .send()
            .await?;
        read_payload(resp).await
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    #[serde(alias = "verification_url")]
    verification_uri: String,
    expires_in: u64,
    #[serde(default = "default_interval")]
    interval: u64,
    #[serde(default)]
    message: Option<String>,
}

fn default_interval() -> u64 {
    5
}

/// Configured scopes plus the reserved ones, de-duplicated, space-joined.
fn request_scope(scopes: &[String]) -> String {
    let mut all: Vec<&str> = scopes.iter().map(String::as_str).collect();
    for reserved in RESERVED_SCOPES {
        if !all.iter().any(|s| s.eq_ignore_ascii_case(reserved)) {
            all.push(reserved);
        }
    }
    all.join(" ")
}

/// Read a provider body as JSON regardless of status.
///
/// OAuth errors arrive as 400 with a JSON body; anything unparseable is kept
/// as a diagnostic object instead of being dropped.
async fn read_payload(resp: reqwest::Response) -> Result<Value, AuthError> {
    let status = resp.status();
    let text = resp.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => Ok(value),
        Err(_) => Ok(json!({
            "error": "invalid_response",
            "status": status.as_u16(),
            "body": text,
        })),
    }
}
