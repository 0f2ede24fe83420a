use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::cache::{Account, TokenCache};
use super::client::IdentityClient;
use super::device_code::{DeviceCodePoll, DeviceCodeSession, DeviceFlowOutcome};
use super::error::AuthError;
use super::store::{build_token_store, TokenStore, TokenStoreConfig};
use super::token::TokenResponse;
use crate::config::AuthSettings;

/// Receives the device-flow instructions meant for the operator.
pub type PromptSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Steps of a single token acquisition.
#[derive(Debug)]
enum AcquireState {
    NoAccount,
    SilentAttempt(Account),
    NoToken,
    DeviceFlowInit,
    FlowStarted(DeviceCodeSession),
    Polling(DeviceCodeSession),
    Success(TokenResponse),
}

/// Obtains bearer tokens, silently from the cache when possible and through
/// an interactive device-code flow otherwise.
///
/// # Example
/// ```no_run
/// use std::path::PathBuf;
/// use sharesync::auth::{TokenProvider, TokenStoreConfig};
/// use sharesync::config::Settings;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = Settings::load(".setup.toml")?;
/// let provider = TokenProvider::new(
///     settings.auth,
///     &TokenStoreConfig::new(PathBuf::from(".cache"), true),
/// )?;
/// let token = provider.acquire_token().await?;
/// println!("{}", token.bearer_header());
/// # Ok(())
/// # }
/// ```
pub struct TokenProvider {
    settings: AuthSettings,
    cache: TokenCache,
    client: IdentityClient,
    prompt: PromptSink,
}

impl TokenProvider {
    /// Build the provider over an encrypted cache, or a plaintext one when
    /// the config allows it. Fails with
    /// [`AuthError::PersistenceUnavailable`] before any cache exists.
    pub fn new(settings: AuthSettings, store: &TokenStoreConfig) -> Result<Self, AuthError> {
        let store = build_token_store(store)?;
        Ok(Self::with_store(settings, store))
    }

    /// Build the provider over an already constructed store.
    pub fn with_store(settings: AuthSettings, store: Box<dyn TokenStore>) -> Self {
        let client = IdentityClient::new(&settings);
        Self {
            settings,
            cache: TokenCache::new(store),
            client,
            prompt: Arc::new(print_prompt),
        }
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = self.client.with_http_client(client);
        self
    }

    /// Replace where device-flow instructions go (stdout by default).
    pub fn with_prompt(mut self, prompt: PromptSink) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Return a usable token for the configured scopes.
    ///
    /// Never returns a token with an empty `access_token`. Device-flow
    /// failures are not retried.
    pub async fn acquire_token(&self) -> Result<TokenResponse, AuthError> {
        let mut state = AcquireState::NoAccount;
        loop {
            state = match state {
                AcquireState::NoAccount => match self.cache.accounts()?.into_iter().next() {
                    Some(account) => AcquireState::SilentAttempt(account),
                    None => AcquireState::NoToken,
                },
                AcquireState::SilentAttempt(account) => {
                    info!(account = %account.home_account_id, "Checking cache for accounts and tokens");
                    match self.acquire_silent(&account).await? {
                        Some(token) => AcquireState::Success(token),
                        None => AcquireState::NoToken,
                    }
                }
                AcquireState::NoToken => {
                    info!("Creating new token");
                    AcquireState::DeviceFlowInit
                }
                AcquireState::DeviceFlowInit => {
                    let session = self.client.initiate_device_flow(&self.settings.scopes).await?;
                    AcquireState::FlowStarted(session)
                }
                AcquireState::FlowStarted(session) => {
                    let instructions = session.instructions();
                    info!(message = %instructions, "Device flow instructions");
                    (self.prompt)(&instructions);
                    AcquireState::Polling(session)
                }
                AcquireState::Polling(session) => match self.poll_until_terminal(&session).await? {
                    DeviceFlowOutcome::Authorized(token) => {
                        self.cache.store_response(
                            &self.settings.client_id,
                            &self.settings.scopes,
                            &token,
                            Utc::now(),
                        )?;
                        AcquireState::Success(token)
                    }
                    DeviceFlowOutcome::Expired => {
                        return Err(fail(json!({
                            "error": "expired_token",
                            "error_description": "device code expired before the user signed in",
                        })));
                    }
                    DeviceFlowOutcome::Denied => {
                        return Err(fail(json!({
                            "error": "access_denied",
                            "error_description": "the user declined the sign-in request",
                        })));
                    }
                },
                AcquireState::Success(token) => {
                    if token.access_token.is_empty() {
                        return Err(fail(serde_json::to_value(&token)?));
                    }
                    info!("Access token retrieved");
                    return Ok(token);
                }
            };
        }
    }

    /// Silent path: a fresh cached token, else a refresh-token redemption.
    ///
    /// A failed refresh is reported as `None`; only cache I/O errors escape.
    async fn acquire_silent(&self, account: &Account) -> Result<Option<TokenResponse>, AuthError> {
        let now = Utc::now();
        if let Some(cached) = self
            .cache
            .find_access_token(account, &self.settings.scopes, now)?
        {
            debug!(expires_at = %cached.expires_at, "Using cached access token");
            return Ok(Some(cached.to_response(now)));
        }

        let Some(refresh_token) = self.cache.refresh_token(account)? else {
            debug!("No refresh token cached");
            return Ok(None);
        };

        let payload = match self
            .client
            .redeem_refresh_token(&refresh_token, &self.settings.scopes)
            .await
        {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "Refresh request failed");
                return Ok(None);
            }
        };
        match TokenResponse::from_payload(payload) {
            Ok(token) => {
                self.cache.store_response(
                    &self.settings.client_id,
                    &self.settings.scopes,
                    &token,
                    Utc::now(),
                )?;
                debug!("Access token refreshed");
                Ok(Some(token))
            }
            Err(err) => {
                warn!(error = %err, "Refresh token rejected");
                Ok(None)
            }
        }
    }

    /// Poll at the provider's interval until a terminal outcome or expiry.
    async fn poll_until_terminal(
        &self,
        session: &DeviceCodeSession,
    ) -> Result<DeviceFlowOutcome, AuthError> {
        let mut session = session.clone();
        loop {
            if Utc::now() >= session.expires_at {
                return Ok(DeviceFlowOutcome::Expired);
            }
            tokio::time::sleep(Duration::from_secs(session.interval_secs)).await;
            match self.client.poll_device_code(&session).await {
                Ok(DeviceCodePoll::Authorized { token }) => {
                    return Ok(DeviceFlowOutcome::Authorized(token))
                }
                Ok(DeviceCodePoll::Pending { .. }) => continue,
                Ok(DeviceCodePoll::SlowDown { interval_secs }) => {
                    debug!(interval_secs, "Provider asked to slow down");
                    session.interval_secs = interval_secs;
                }
                Ok(DeviceCodePoll::AccessDenied) => return Ok(DeviceFlowOutcome::Denied),
                Ok(DeviceCodePoll::Expired) => return Ok(DeviceFlowOutcome::Expired),
                Err(AuthError::Network(message)) => {
                    return Err(fail(json!({
                        "error": "request_failed",
                        "error_description": message,
                    })));
                }
                Err(err) => {
                    if let Some(payload) = err.payload() {
                        error!(payload = %payload, "Failed to acquire token");
                    }
                    return Err(err);
                }
            }
        }
    }
}

fn fail(payload: serde_json::Value) -> AuthError {
    error!(payload = %payload, "Failed to acquire token");
    AuthError::TokenAcquisitionFailed { payload }
}

fn print_prompt(message: &str) {
    use std::io::Write;
    println!("{message}");
    let _ = std::io::stdout().flush();
}
