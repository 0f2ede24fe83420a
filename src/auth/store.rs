use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use strum::Display;
use thiserror::Error;
use tracing::{info, warn};

use super::error::AuthError;

/// Durable backing for the serialized token cache.
///
/// The cache document is opaque to the store; implementations only move a
/// string in and out of their medium.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, AuthError>;
    fn save(&self, contents: &str) -> Result<(), AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
    fn kind(&self) -> StoreKind;
}

/// Whether a store keeps the cache encrypted at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StoreKind {
    Encrypted,
    Plaintext,
}

/// Where to keep the token cache and whether plaintext is acceptable.
#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub location: PathBuf,
    pub allow_plaintext: bool,
}

impl TokenStoreConfig {
    pub fn new(location: PathBuf, allow_plaintext: bool) -> Self {
        Self {
            location,
            allow_plaintext,
        }
    }

    pub fn default_location() -> PathBuf {
        directories::ProjectDirs::from("", "", "sharesync")
            .map(|dirs| dirs.data_local_dir().join("token_cache.bin"))
            .unwrap_or_else(|| PathBuf::from(".cache"))
    }
}

/// Why the encrypted backend could not be used.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption unsupported: {0}")]
    Unsupported(String),
    #[error("encryption backend failed: {0}")]
    Backend(String),
}

/// Build the token store for `config`.
///
/// Tries the OS secret store first and falls back to a plaintext file only
/// when `allow_plaintext` is set.
pub fn build_token_store(config: &TokenStoreConfig) -> Result<Box<dyn TokenStore>, AuthError> {
    build_token_store_with(config, build_encrypted_store)
}

/// Same as [`build_token_store`] with a caller-supplied encrypted backend.
pub fn build_token_store_with<F>(
    config: &TokenStoreConfig,
    encrypted: F,
) -> Result<Box<dyn TokenStore>, AuthError>
where
    F: FnOnce(&Path) -> Result<Box<dyn TokenStore>, EncryptionError>,
{
    info!(location = %config.location.display(), "Attempting encrypted token persistence");
    let failure = match encrypted(&config.location) {
        Ok(store) => return Ok(store),
        Err(failure) => failure,
    };
    if !config.allow_plaintext {
        warn!(
            error = %failure,
            "Plaintext fallback disabled and unable to acquire encrypted persistence"
        );
        return Err(AuthError::PersistenceUnavailable(failure.to_string()));
    }
    warn!(error = %failure, "Encryption not available, using plaintext token persistence");
    Ok(Box::new(FileTokenStore::new(config.location.clone())))
}

/// Open the platform secret store for `location`.
#[cfg(feature = "system-keyring")]
pub fn build_encrypted_store(location: &Path) -> Result<Box<dyn TokenStore>, EncryptionError> {
    Ok(Box::new(KeyringTokenStore::open(location)?))
}

#[cfg(not(feature = "system-keyring"))]
pub fn build_encrypted_store(_location: &Path) -> Result<Box<dyn TokenStore>, EncryptionError> {
    Err(EncryptionError::Unsupported(
        "built without the system-keyring feature".to_string(),
    ))
}

/// Plaintext JSON file store, written atomically with owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, AuthError> {
        match fs::read_to_string(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }

    fn save(&self, contents: &str) -> Result<(), AuthError> {
        atomic_write(&self.path, contents.as_bytes())
    }

    fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Plaintext
    }
}

/// Store backed by the OS credential manager (Keychain, Credential Manager,
/// Secret Service). All three keep entries across reboots.
#[cfg(feature = "system-keyring")]
pub struct KeyringTokenStore {
    entry: keyring::Entry,
}

#[cfg(feature = "system-keyring")]
impl KeyringTokenStore {
    const SERVICE_NAME: &'static str = "sharesync";

    /// Create the entry and probe it with a read.
    ///
    /// Some platforms only report a missing backend on first access, so the
    /// probe is what actually decides whether encryption is usable.
    pub fn open(location: &Path) -> Result<Self, EncryptionError> {
        let entry = keyring::Entry::new(Self::SERVICE_NAME, &location_key(location))
            .map_err(classify_keyring_error)?;
        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(Self { entry }),
            Err(err) => Err(classify_keyring_error(err)),
        }
    }
}

#[cfg(feature = "system-keyring")]
impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Result<Option<String>, AuthError> {
        match self.entry.get_password() {
            Ok(data) => Ok(Some(data)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(AuthError::Storage(format!("Keyring error: {err}"))),
        }
    }

    fn save(&self, contents: &str) -> Result<(), AuthError> {
        self.entry
            .set_password(contents)
            .map_err(|err| AuthError::Storage(format!("Keyring error: {err}")))
    }

    fn clear(&self) -> Result<(), AuthError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(AuthError::Storage(format!("Keyring error: {err}"))),
        }
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Encrypted
    }
}

#[cfg(feature = "system-keyring")]
fn classify_keyring_error(err: keyring::Error) -> EncryptionError {
    match err {
        keyring::Error::NoStorageAccess(_) => EncryptionError::Unsupported(err.to_string()),
        other => EncryptionError::Backend(other.to_string()),
    }
}

/// Stable keyring account name for a cache location.
#[cfg_attr(not(feature = "system-keyring"), allow(dead_code))]
fn location_key(location: &Path) -> String {
    let digest = Sha256::digest(location.to_string_lossy().as_bytes());
    format!("cache-{}", URL_SAFE_NO_PAD.encode(&digest[..16]))
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        AuthError::Storage(format!("Cache path {} has no file name", path.display()))
    })?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result.and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(AuthError::Io(err.to_string()));
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn failing(_: &Path) -> Result<Box<dyn TokenStore>, EncryptionError> {
        Err(EncryptionError::Unsupported("no secret service".to_string()))
    }

    #[test]
    fn file_store_round_trip_works() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("cache.json"));
        assert!(store.load().unwrap().is_none());
        store.save("{\"version\":1}").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("{\"version\":1}"));
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_owner_only() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("cache.json"));
        store.save("{}").unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("cache.json"));
        store.save("{}").unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn fallback_disabled_reports_persistence_unavailable() {
        let dir = TempDir::new().unwrap();
        let config = TokenStoreConfig::new(dir.path().join("cache.json"), false);
        let result = build_token_store_with(&config, failing);
        assert!(matches!(
            result,
            Err(AuthError::PersistenceUnavailable(msg)) if msg.contains("no secret service")
        ));
    }

    #[test]
    fn fallback_enabled_yields_plaintext_store() {
        let dir = TempDir::new().unwrap();
        let config = TokenStoreConfig::new(dir.path().join("cache.json"), true);
        let store = build_token_store_with(&config, failing).unwrap();
        assert_eq!(store.kind(), StoreKind::Plaintext);
        store.save("{}").unwrap();
        assert!(dir.path().join("cache.json").exists());
    }

    #[test]
    fn encrypted_backend_is_preferred_when_available() {
        let dir = TempDir::new().unwrap();
        let config = TokenStoreConfig::new(dir.path().join("cache.json"), true);
        let mut probed = false;
        let store = build_token_store_with(&config, |location| {
            probed = true;
            assert_eq!(location, dir.path().join("cache.json"));
            Ok(Box::new(FileTokenStore::new(location.to_path_buf())))
        })
        .unwrap();
        assert!(probed);
        assert_eq!(store.kind(), StoreKind::Plaintext);
    }

    #[test]
    fn location_key_is_stable_and_distinct() {
        let a = location_key(Path::new("/var/lib/sharesync/cache"));
        let b = location_key(Path::new("/var/lib/sharesync/cache"));
        let c = location_key(Path::new(".cache"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("cache-"));
    }

    #[cfg(all(target_os = "linux", feature = "system-keyring"))]
    #[test]
    fn linux_keyring_entries_live_in_secret_service() {
        let entry = keyring::Entry::new(
            KeyringTokenStore::SERVICE_NAME,
            &location_key(Path::new("/var/lib/sharesync/cache")),
        )
        .unwrap();
        assert!(entry
            .get_credential()
            .downcast_ref::<keyring::secret_service::SsCredential>()
            .is_some());
    }

    #[test]
    fn store_kind_displays_lowercase() {
        assert_eq!(StoreKind::Encrypted.to_string(), "encrypted");
        assert_eq!(StoreKind::Plaintext.to_string(), "plaintext");
    }
}
