//! Persisted account and token cache.
//!
//! Every read reloads the document from the backing [`TokenStore`] and every
//! mutation writes it straight back, so the store is the single source of
//! truth for the process.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::error::AuthError;
use super::store::{StoreKind, TokenStore};
use super::token::TokenResponse;

const CACHE_FILE_VERSION: u32 = 1;

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 300;

/// Upper bound on any provider-supplied lifetime.
const MAX_LIFETIME_SECS: u64 = 86_400 * 365;

/// Scopes the identity provider adds to every request; never used for matching.
pub const RESERVED_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// A previously authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub home_account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Cached access token for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccessToken {
    pub secret: String,
    /// Scopes the provider granted.
    pub scopes: Vec<String>,
    /// Scopes the token was requested for, as configured (e.g. `.../.default`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requested: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
}

impl CachedAccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS) > now
    }

    /// The provider may answer with a different scope spelling than was
    /// asked for, so either set satisfies a request.
    fn covers(&self, requested: &[String]) -> bool {
        contains_all(&self.scopes, requested) || contains_all(&self.requested, requested)
    }

    /// Rebuild the caller-facing payload from the cached record.
    pub fn to_response(&self, now: DateTime<Utc>) -> TokenResponse {
        TokenResponse {
            access_token: self.secret.clone(),
            token_type: Some("Bearer".to_string()),
            expires_in: Some((self.expires_at - now).num_seconds().max(0) as u64),
            scope: Some(self.scopes.join(" ")),
            refresh_token: None,
            id_token: None,
            client_info: None,
            extra: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    account: Account,
    #[serde(default)]
    access_tokens: Vec<CachedAccessToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
}

impl Default for CacheDocument {
    fn default() -> Self {
        Self {
            version: CACHE_FILE_VERSION,
            entries: BTreeMap::new(),
            saved_at: None,
        }
    }
}

/// Account/token cache over a [`TokenStore`].
pub struct TokenCache {
    store: Box<dyn TokenStore>,
}

impl TokenCache {
    pub fn new(store: Box<dyn TokenStore>) -> Self {
        Self { store }
    }

    pub fn kind(&self) -> StoreKind {
        self.store.kind()
    }

    /// Accounts known to the cache, in stable order.
    pub fn accounts(&self) -> Result<Vec<Account>, AuthError> {
        let document = self.read()?;
        Ok(document
            .entries
            .into_values()
            .map(|entry| entry.account)
            .collect())
    }

    /// Unexpired access token for `account` covering `scopes`.
    pub fn find_access_token(
        &self,
        account: &Account,
        scopes: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<CachedAccessToken>, AuthError> {
        let document = self.read()?;
        let Some(entry) = document.entries.get(&account.home_account_id) else {
            return Ok(None);
        };
        Ok(entry
            .access_tokens
            .iter()
            .find(|token| token.is_fresh(now) && token.covers(scopes))
            .cloned())
    }

    pub fn refresh_token(&self, account: &Account) -> Result<Option<String>, AuthError> {
        let document = self.read()?;
        Ok(document
            .entries
            .get(&account.home_account_id)
            .and_then(|entry| entry.refresh_token.clone()))
    }

    /// Record a token response and return the account it belongs to.
    ///
    /// Access tokens sharing a scope with the new one are replaced; a new
    /// refresh token replaces the old one, an absent one keeps it.
    pub fn store_response(
        &self,
        client_id: &str,
        requested: &[String],
        response: &TokenResponse,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError> {
        let account = account_from_response(client_id, response);
        let granted = match response.scopes() {
            scopes if scopes.is_empty() => requested.to_vec(),
            scopes => scopes,
        };
        let token = CachedAccessToken {
            secret: response.access_token.clone(),
            scopes: granted,
            requested: requested
                .iter()
                .filter(|scope| !is_reserved(scope))
                .cloned()
                .collect(),
            expires_at: expires_after(now, response.expires_in.unwrap_or(3600)),
            cached_at: now,
        };

        let mut document = self.read()?;
        let entry = document
            .entries
            .entry(account.home_account_id.clone())
            .or_insert_with(|| CacheEntry {
                account: account.clone(),
                access_tokens: Vec::new(),
                refresh_token: None,
            });
        if account.username.is_some() {
            entry.account = account.clone();
        }
        entry.access_tokens.retain(|existing| {
            !overlaps(&existing.scopes, &token.scopes)
                && !(!token.requested.is_empty() && overlaps(&existing.requested, &token.requested))
        });
        entry.access_tokens.push(token);
        if let Some(refresh) = &response.refresh_token {
            entry.refresh_token = Some(refresh.clone());
        }
        let stored = entry.account.clone();
        self.write(document, now)?;
        debug!(account = %stored.home_account_id, "Token cached");
        Ok(stored)
    }

    /// Drop everything the cache holds.
    pub fn clear(&self) -> Result<(), AuthError> {
        self.store.clear()
    }

    fn read(&self) -> Result<CacheDocument, AuthError> {
        let Some(raw) = self.store.load()? else {
            return Ok(CacheDocument::default());
        };
        if raw.trim().is_empty() {
            return Ok(CacheDocument::default());
        }
        let document: CacheDocument = serde_json::from_str(&raw)?;
        if document.version != CACHE_FILE_VERSION {
            warn!(version = document.version, "Ignoring token cache with unsupported version");
            return Ok(CacheDocument::default());
        }
        Ok(document)
    }

    fn write(&self, mut document: CacheDocument, now: DateTime<Utc>) -> Result<(), AuthError> {
        document.saved_at = Some(now);
        let serialized = serde_json::to_string_pretty(&document)?;
        self.store.save(&serialized)
    }
}

/// `now + secs`, with `secs` clamped so absurd provider values cannot overflow.
pub(crate) fn expires_after(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    let secs = secs.min(MAX_LIFETIME_SECS) as i64;
    now + Duration::seconds(secs)
}

fn contains_all(have: &[String], wanted: &[String]) -> bool {
    if have.is_empty() {
        return false;
    }
    wanted
        .iter()
        .filter(|scope| !is_reserved(scope))
        .all(|scope| have.iter().any(|h| h.eq_ignore_ascii_case(scope)))
}

fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().any(|x| b.iter().any(|y| x.eq_ignore_ascii_case(y)))
}

pub fn is_reserved(scope: &str) -> bool {
    RESERVED_SCOPES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(scope))
}

/// Derive the account a token response belongs to.
///
/// `client_info` (`uid`.`utid`) is preferred for the identifier, `id_token`
/// claims supply the username. Without either, the client id stands in as
/// the single account of this deployment.
pub fn account_from_response(client_id: &str, response: &TokenResponse) -> Account {
    let client_info = response.client_info.as_deref().and_then(decode_segment);
    let claims = response
        .id_token
        .as_deref()
        .and_then(|jwt| jwt.split('.').nth(1))
        .and_then(decode_segment);

    let claim = |value: &Option<Value>, key: &str| {
        value
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let home_account_id = match (claim(&client_info, "uid"), claim(&client_info, "utid")) {
        (Some(uid), Some(utid)) => format!("{uid}.{utid}"),
        _ => match (claim(&claims, "oid"), claim(&claims, "tid")) {
            (Some(oid), Some(tid)) => format!("{oid}.{tid}"),
            _ => client_id.to_string(),
        },
    };

    Account {
        home_account_id,
        username: claim(&claims, "preferred_username").or_else(|| claim(&claims, "upn")),
        tenant_id: claim(&claims, "tid").or_else(|| claim(&client_info, "utid")),
    }
}

fn decode_segment(segment: &str) -> Option<Value> {
    let bytes = URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}
