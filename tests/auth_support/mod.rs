#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use sharesync::auth::{AuthError, EncryptionError, StoreKind, TokenProvider, TokenStore};
use sharesync::config::AuthSettings;
use wiremock::MockServer;

/// Shared in-memory cache blob; clones see the same contents.
#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    blob: Arc<Mutex<Option<String>>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<String> {
        self.blob.lock().expect("store lock poisoned").clone()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn load(&self) -> Result<Option<String>, AuthError> {
        Ok(self.contents())
    }

    fn save(&self, contents: &str) -> Result<(), AuthError> {
        *self.blob.lock().expect("store lock poisoned") = Some(contents.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.blob.lock().expect("store lock poisoned") = None;
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Encrypted
    }
}

/// Encrypted backend that is never available.
pub fn no_encryption(_: &Path) -> Result<Box<dyn TokenStore>, EncryptionError> {
    Err(EncryptionError::Unsupported("secret service not running".to_string()))
}

pub fn settings(server: &MockServer) -> AuthSettings {
    AuthSettings {
        authority: format!("{}/common", server.uri()),
        client_id: "client-123".to_string(),
        scopes: vec!["Sites.ReadWrite.All".to_string()],
        endpoint: format!("{}/v1.0", server.uri()),
    }
}

/// Provider over `store` that records device-flow prompts.
pub fn provider(
    server: &MockServer,
    store: InMemoryTokenStore,
) -> (TokenProvider, Arc<Mutex<Vec<String>>>) {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let sink = prompts.clone();
    let provider = TokenProvider::with_store(settings(server), Box::new(store)).with_prompt(
        Arc::new(move |message: &str| {
            sink.lock().expect("prompt lock poisoned").push(message.to_string())
        }),
    );
    (provider, prompts)
}

pub fn device_code_body() -> Value {
    json!({
        "device_code": "device-123",
        "user_code": "ABCD-EFGH",
        "verification_uri": "https://microsoft.com/devicelogin",
        "expires_in": 900,
        "interval": 0,
        "message": "To sign in, use a web browser to open https://microsoft.com/devicelogin and enter the code ABCD-EFGH."
    })
}

/// `client_info` for uid `user-1` in tenant `tenant-1`.
pub fn client_info() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(br#"{"uid":"user-1","utid":"tenant-1"}"#)
}

pub fn token_body(access_token: &str) -> Value {
    json!({
        "token_type": "Bearer",
        "scope": "Sites.ReadWrite.All openid profile offline_access",
        "expires_in": 3600,
        "access_token": access_token,
        "refresh_token": "refresh-1",
        "client_info": client_info(),
    })
}
