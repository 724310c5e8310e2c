//! Token persistence for the access/refresh credential pair.
//!
//! Tokens live in two named entries, `access_token` and `refresh_token`, each
//! with its own expiry. An expired entry reads as absent. Three backends are
//! provided: process memory, a JSON file in the cache directory, and the OS
//! keychain.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Access tokens are minted for one hour by the forum backend
const ACCESS_TOKEN_TTL_MINUTES: i64 = 60;

/// Refresh tokens live for seven days
const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// Token file name in the cache directory
const TOKEN_FILE: &str = "tokens.json";

#[derive(Error, Debug)]
pub enum TokenStoreError {
    #[error("Token file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token data is malformed: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Keychain access failed: {0}")]
    Keyring(#[from] keyring::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn entry_name(&self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Refresh => "refresh_token",
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            TokenKind::Access => Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
            TokenKind::Refresh => Duration::days(REFRESH_TOKEN_TTL_DAYS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenEntry {
    /// New entry expiring after the default lifetime for `kind`
    pub fn issue(kind: TokenKind, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: Utc::now() + kind.ttl(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Access and refresh token as handed out by login and registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access: String,
    #[serde(rename = "refresh")]
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Storage for the credential pair.
///
/// Implementors provide the two primitive entry operations; everything else is
/// derived. Methods are synchronous and must not be held across an await.
pub trait TokenStore: Send + Sync {
    fn entry(&self, kind: TokenKind) -> Option<TokenEntry>;

    fn replace(&self, kind: TokenKind, entry: Option<TokenEntry>) -> Result<(), TokenStoreError>;

    /// Current unexpired token of the given kind
    fn token(&self, kind: TokenKind) -> Option<String> {
        self.entry(kind)
            .filter(|e| !e.is_expired())
            .map(|e| e.token)
    }

    fn access(&self) -> Option<String> {
        self.token(TokenKind::Access)
    }

    fn refresh(&self) -> Option<String> {
        self.token(TokenKind::Refresh)
    }

    fn credentials(&self) -> Option<CredentialPair> {
        Some(CredentialPair::new(self.access()?, self.refresh()?))
    }

    fn set_pair(&self, pair: &CredentialPair) -> Result<(), TokenStoreError> {
        self.replace(
            TokenKind::Refresh,
            Some(TokenEntry::issue(TokenKind::Refresh, &pair.refresh_token)),
        )?;
        self.set_access(&pair.access)
    }

    fn set_access(&self, access: &str) -> Result<(), TokenStoreError> {
        self.replace(
            TokenKind::Access,
            Some(TokenEntry::issue(TokenKind::Access, access)),
        )
    }

    fn set_refresh(&self, refresh: &str) -> Result<(), TokenStoreError> {
        self.replace(
            TokenKind::Refresh,
            Some(TokenEntry::issue(TokenKind::Refresh, refresh)),
        )
    }

    /// Drop both entries
    fn clear(&self) -> Result<(), TokenStoreError> {
        // Clear both even if the first fails so no half pair survives
        let access = self.replace(TokenKind::Access, None);
        let refresh = self.replace(TokenKind::Refresh, None);
        access.and(refresh)
    }
}

impl<S: TokenStore + ?Sized> TokenStore for Arc<S> {
    fn entry(&self, kind: TokenKind) -> Option<TokenEntry> {
        (**self).entry(kind)
    }

    fn replace(&self, kind: TokenKind, entry: Option<TokenEntry>) -> Result<(), TokenStoreError> {
        (**self).replace(kind, entry)
    }
}

impl<S: TokenStore + ?Sized> TokenStore for Box<S> {
    fn entry(&self, kind: TokenKind) -> Option<TokenEntry> {
        (**self).entry(kind)
    }

    fn replace(&self, kind: TokenKind, entry: Option<TokenEntry>) -> Result<(), TokenStoreError> {
        (**self).replace(kind, entry)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process-local store. Tokens are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<TokenKind, TokenEntry>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: &CredentialPair) -> Self {
        let store = Self::new();
        {
            let mut entries = lock(&store.entries);
            entries.insert(
                TokenKind::Access,
                TokenEntry::issue(TokenKind::Access, &pair.access),
            );
            entries.insert(
                TokenKind::Refresh,
                TokenEntry::issue(TokenKind::Refresh, &pair.refresh_token),
            );
        }
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn entry(&self, kind: TokenKind) -> Option<TokenEntry> {
        lock(&self.entries).get(&kind).cloned()
    }

    fn replace(&self, kind: TokenKind, entry: Option<TokenEntry>) -> Result<(), TokenStoreError> {
        let mut entries = lock(&self.entries);
        match entry {
            Some(entry) => {
                entries.insert(kind, entry);
            }
            None => {
                entries.remove(&kind);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct TokenFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<TokenEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<TokenEntry>,
}

impl TokenFile {
    fn slot(&mut self, kind: TokenKind) -> &mut Option<TokenEntry> {
        match kind {
            TokenKind::Access => &mut self.access_token,
            TokenKind::Refresh => &mut self.refresh_token,
        }
    }
}

/// Tokens persisted as JSON in the cache directory so a session survives
/// restarts. Every change is written through; reads come from memory.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    state: Mutex<TokenFile>,
}

impl FileTokenStore {
    /// Open the token file in `cache_dir`, starting empty if it does not exist
    pub fn open(cache_dir: &Path) -> Result<Self, TokenStoreError> {
        let path = cache_dir.join(TOKEN_FILE);
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            TokenFile::default()
        };

        debug!(path = %path.display(), "Opened token file");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn entry(&self, kind: TokenKind) -> Option<TokenEntry> {
        lock(&self.state).slot(kind).clone()
    }

    fn replace(&self, kind: TokenKind, entry: Option<TokenEntry>) -> Result<(), TokenStoreError> {
        let mut state = lock(&self.state);
        *state.slot(kind) = entry;
        write_atomic(&self.path, &state)
    }
}

/// Write the token file via temp file + rename, owner read/write only
fn write_atomic(path: &Path, data: &TokenFile) -> Result<(), TokenStoreError> {
    let json = serde_json::to_string_pretty(data)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let tmp_path = dir.join(format!(".{}.tmp.{}", TOKEN_FILE, std::process::id()));

    std::fs::write(&tmp_path, json.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Tokens kept in the OS keychain, one keychain item per entry.
///
/// Entries are cached after the first read. Writes update the cache before
/// the keychain, so a keychain failure leaves the process with the newest
/// token even though it was not persisted.
pub struct KeyringTokenStore {
    access: Entry,
    refresh: Entry,
    cache: Mutex<HashMap<TokenKind, Option<TokenEntry>>>,
}

impl KeyringTokenStore {
    pub fn new(service: &str) -> Result<Self, TokenStoreError> {
        Ok(Self {
            access: Entry::new(service, TokenKind::Access.entry_name())?,
            refresh: Entry::new(service, TokenKind::Refresh.entry_name())?,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn keyring_entry(&self, kind: TokenKind) -> &Entry {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn load(&self, kind: TokenKind) -> Result<Option<TokenEntry>, TokenStoreError> {
        match self.keyring_entry(kind).get_password() {
            Ok(secret) => Ok(Some(serde_json::from_str(&secret)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl TokenStore for KeyringTokenStore {
    fn entry(&self, kind: TokenKind) -> Option<TokenEntry> {
        let mut cache = lock(&self.cache);
        if let Some(cached) = cache.get(&kind) {
            return cached.clone();
        }
        match self.load(kind) {
            Ok(entry) => {
                cache.insert(kind, entry.clone());
                entry
            }
            Err(e) => {
                // Not cached, the next read asks the keychain again
                warn!(entry = kind.entry_name(), error = %e, "Failed to read token from keychain");
                None
            }
        }
    }

    fn replace(&self, kind: TokenKind, entry: Option<TokenEntry>) -> Result<(), TokenStoreError> {
        let mut cache = lock(&self.cache);
        cache.insert(kind, entry.clone());

        let item = self.keyring_entry(kind);
        match entry {
            Some(entry) => item.set_password(&serde_json::to_string(&entry)?)?,
            None => match item.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }
}
