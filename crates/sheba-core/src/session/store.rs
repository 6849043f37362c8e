//! Durable persistence of the session token and user record.
//!
//! The token and the JSON-serialized user live under two independent keys of
//! a [`KeyValueStore`]. Nothing here makes the pair atomic; the session
//! manager writes and clears both together and treats a half-present pair as
//! corrupt.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use sheba_types::User;

use crate::config::StorageConfig;

/// Synchronous string key-value storage that survives restarts.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    /// Returns an error if the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    /// Returns an error if the backing medium cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    ///
    /// # Errors
    /// Returns an error if the backing medium cannot be written.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store. Nothing outlives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with entries.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Returns a copy of all entries.
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Store backed by a JSON object file, written with restricted permissions
/// (0600 on unix).
///
/// Every operation reads the file fresh so that separate processes see each
/// other's writes. An empty map removes the file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session file {}", self.path.display()))
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path).with_context(|| {
                    format!("Failed to remove session file {}", self.path.display())
                })?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(entries).context("Failed to serialize session file")?;

        // Write a sibling file and rename it over the target, so readers
        // never see a truncated session.
        let tmp_path = self.tmp_path();
        if tmp_path.exists() {
            // A leftover may carry looser permissions than a fresh file.
            fs::remove_file(&tmp_path)
                .with_context(|| format!("Failed to remove {}", tmp_path.display()))?;
        }
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&tmp_path)
            .with_context(|| format!("Failed to open {} for writing", tmp_path.display()))?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.sync_all())
            .with_context(|| format!("Failed to write to {}", tmp_path.display()))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        // A corrupt file cannot hold a usable entry; start over.
        let mut entries = self.load().unwrap_or_default();
        entries.remove(key);
        self.save(&entries)
    }
}

/// Token plus serialized user, as held in storage.
#[derive(Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    pub token: String,
    /// JSON-serialized [`User`]
    pub user: String,
}

impl PersistedRecord {
    /// # Errors
    /// Returns an error if the user cannot be serialized.
    pub fn new(token: impl Into<String>, user: &User) -> Result<Self> {
        Ok(Self {
            token: token.into(),
            user: serde_json::to_string(user).context("Failed to serialize user record")?,
        })
    }

    /// # Errors
    /// Returns an error if the stored user is not a valid user record.
    pub fn parse_user(&self) -> Result<User, serde_json::Error> {
        serde_json::from_str(&self.user)
    }
}

impl fmt::Debug for PersistedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedRecord")
            .field("token", &crate::logging::redact(&self.token))
            .field("user", &self.user)
            .finish()
    }
}

/// What storage currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredSession {
    /// Neither key is present.
    Absent,
    /// Exactly one of the two keys is present.
    Partial,
    Present(PersistedRecord),
}

/// The session's two-key view of a [`KeyValueStore`].
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
    keys: StorageConfig,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, keys: StorageConfig) -> Self {
        Self { backend, keys }
    }

    pub fn keys(&self) -> &StorageConfig {
        &self.keys
    }

    /// # Errors
    /// Returns an error if the backing store cannot be read.
    pub fn read(&self) -> Result<StoredSession> {
        let token = self.backend.get(&self.keys.token_key)?;
        let user = self.backend.get(&self.keys.user_key)?;

        Ok(match (token, user) {
            (Some(token), Some(user)) => StoredSession::Present(PersistedRecord { token, user }),
            (None, None) => StoredSession::Absent,
            _ => StoredSession::Partial,
        })
    }

    /// Writes both keys.
    ///
    /// # Errors
    /// Returns an error if either key cannot be written.
    pub fn write(&self, record: &PersistedRecord) -> Result<()> {
        self.backend.set(&self.keys.token_key, &record.token)?;
        self.backend.set(&self.keys.user_key, &record.user)
    }

    /// Overwrites only the user key.
    ///
    /// # Errors
    /// Returns an error if the user cannot be serialized or written.
    pub fn write_user(&self, user: &User) -> Result<()> {
        let json = serde_json::to_string(user).context("Failed to serialize user record")?;
        self.backend.set(&self.keys.user_key, &json)
    }

    /// Removes both keys. Both removals are attempted even if the first fails.
    ///
    /// # Errors
    /// Returns the first removal error.
    pub fn clear(&self) -> Result<()> {
        let token = self.backend.remove(&self.keys.token_key);
        let user = self.backend.remove(&self.keys.user_key);
        token.and(user)
    }
}
