//! OAuth device-code token acquisition and persisted token cache.

pub mod cache;
pub mod client;
pub mod device_code;
pub mod error;
pub mod provider;
pub mod store;
pub mod token;

pub use cache::{Account, CachedAccessToken, TokenCache};
pub use client::IdentityClient;
pub use device_code::{DeviceCodePoll, DeviceCodeSession, DeviceFlowOutcome};
pub use error::AuthError;
pub use provider::{PromptSink, TokenProvider};
pub use store::{
    build_token_store, build_token_store_with, EncryptionError, FileTokenStore, StoreKind,
    TokenStore, TokenStoreConfig,
};
pub use token::TokenResponse;
