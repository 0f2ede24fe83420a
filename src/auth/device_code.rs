use chrono::{DateTime, Utc};

use super::TokenResponse;

/// Device-code session details issued by the identity provider.
///
/// # Example
/// ```no_run
/// use sharesync::auth::DeviceCodeSession;
/// use chrono::{DateTime, Utc};
///
/// let session = DeviceCodeSession {
///     verification_url: "https://microsoft.com/devicelogin".to_string(),
///     user_code: "ABCD-EFGH".to_string(),
///     device_code: "device-code".to_string(),
///     interval_secs: 5,
///     expires_at: DateTime::<Utc>::from(std::time::SystemTime::now()),
///     message: None,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct DeviceCodeSession {
    pub verification_url: String,
    pub user_code: String,
    pub device_code: String,
    pub interval_secs: u64,
    pub expires_at: DateTime<Utc>,
    /// Operator-facing instructions, as worded by the provider.
    pub message: Option<String>,
}

impl DeviceCodeSession {
    /// Instructions to show the operator, falling back to URL + code.
    pub fn instructions(&self) -> String {
        match &self.message {
            Some(message) if !message.trim().is_empty() => message.clone(),
            _ => format!(
                "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
                self.verification_url, self.user_code
            ),
        }
    }
}

/// Outcome of a single poll against the token endpoint.
#[derive(Debug, Clone)]
pub enum DeviceCodePoll {
    Pending { interval_secs: u64 },
    SlowDown { interval_secs: u64 },
    Authorized { token: TokenResponse },
    AccessDenied,
    Expired,
}

/// Terminal outcome of a whole device-code flow.
#[derive(Debug, Clone)]
pub enum DeviceFlowOutcome {
    Authorized(TokenResponse),
    Expired,
    Denied,
}
