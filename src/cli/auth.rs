//! CLI auth command handlers for login, status, and logout.

use crate::auth::{build_token_store, StoreKind, TokenCache, TokenProvider};
use crate::config::Settings;
use crate::error::Result;

use super::Cli;

/// Handle `sharesync login`.
pub async fn handle_login(cli: &Cli) -> Result<()> {
    let settings = Settings::load(&cli.setup)?;
    let provider = TokenProvider::new(settings.auth, &cli.store_config())?;
    if provider.cache().kind() == StoreKind::Plaintext {
        println!("⚠️  Token cache is stored unencrypted");
    }

    provider.acquire_token().await?;
    println!("✅ Login successful!");
    Ok(())
}

/// Handle `sharesync status`.
pub fn handle_status(cli: &Cli) -> Result<()> {
    let config = cli.store_config();
    let store = build_token_store(&config)?;
    let kind = store.kind();
    let cache = TokenCache::new(store);

    println!("🔐 Authentication Status\n");
    println!("  Cache: {} ({kind})", config.location.display());

    let accounts = cache.accounts()?;
    if accounts.is_empty() {
        println!("  Account: ❌ Not logged in");
    }
    for account in accounts {
        let name = account
            .username
            .as_deref()
            .unwrap_or(&account.home_account_id);
        println!("  Account: ✅ {name}");
    }
    Ok(())
}

/// Handle `sharesync logout`.
pub fn handle_logout(cli: &Cli) -> Result<()> {
    let store = build_token_store(&cli.store_config())?;
    TokenCache::new(store).clear()?;
    println!("✅ Logged out");
    Ok(())
}
