//! Durable account storage
//!
//! The [`AccountStore`] keeps every account in memory and rewrites the whole
//! store through an injected [`Persistence`] backend after each mutation.
//! Writes are synchronous; the server loop is single-threaded so there is no
//! interleaving to guard against. A failed write is logged and the in-memory
//! state stays ahead of disk until the next successful write.

use log::{error, info};
use serde::{Deserialize, Serialize};
use shared::StatBlock;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Sequential account identifier, stored as a decimal string
pub type AccountId = String;

/// Persisted accounts keyed by id
pub type AccountMap = BTreeMap<AccountId, AccountRecord>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub username: String,
    #[serde(rename = "password")]
    pub password_hash: String,
    #[serde(rename = "logins", default)]
    pub login_count: u64,
    #[serde(default)]
    pub stats: Option<StatBlock>,
}

impl AccountRecord {
    pub fn new(username: &str, password_hash: &str) -> Self {
        Self {
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            login_count: 0,
            stats: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),
    #[error("username '{0}' is taken")]
    UsernameTaken(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Where the account map lives between server runs
pub trait Persistence: Send {
    fn load(&self) -> Result<AccountMap, StoreError>;

    /// Replaces the stored map with `accounts` as a whole.
    fn save(&mut self, accounts: &AccountMap) -> Result<(), StoreError>;
}

/// On-disk encoding of the account file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum StoreFormat {
    /// Human readable, compatible with older account files
    #[default]
    Json,
    /// Compact binary snapshot
    Bincode,
}

/// Stores the account map in a single file
///
/// Saves go to a sibling temp file that is then renamed over the target, so
/// the file on disk is always either the old or the new map.
pub struct FileBackend {
    path: PathBuf,
    format: StoreFormat,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>, format: StoreFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl Persistence for FileBackend {
    fn load(&self) -> Result<AccountMap, StoreError> {
        if !self.path.exists() {
            info!(
                "No account file at {}, starting fresh",
                self.path.display()
            );
            return Ok(AccountMap::new());
        }

        let bytes = fs::read(&self.path)?;
        let accounts = match self.format {
            StoreFormat::Json => serde_json::from_slice(&bytes)?,
            StoreFormat::Bincode => bincode::deserialize(&bytes)?,
        };
        Ok(accounts)
    }

    fn save(&mut self, accounts: &AccountMap) -> Result<(), StoreError> {
        let bytes = match self.format {
            StoreFormat::Json => serde_json::to_vec_pretty(accounts)?,
            StoreFormat::Bincode => bincode::serialize(accounts)?,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp = self.temp_path();
        fs::write(&temp, bytes)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

/// Keeps the last saved map in memory
///
/// Clones share the same snapshot, so a test can hand one clone to the
/// store and inspect what was "written" through another.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    snapshot: Arc<Mutex<AccountMap>>,
    failing: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: AccountMap) -> Self {
        let backend = Self::default();
        *backend.lock() = accounts;
        backend
    }

    /// Makes every following save fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> AccountMap {
        self.lock().clone()
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AccountMap> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Persistence for MemoryBackend {
    fn load(&self) -> Result<AccountMap, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&mut self, accounts: &AccountMap) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory backend set to fail".to_string()));
        }
        *self.lock() = accounts.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Account repository used by the command dispatcher
pub struct AccountStore {
    accounts: AccountMap,
    backend: Box<dyn Persistence>,
}

impl AccountStore {
    /// Loads the existing accounts from `backend`
    pub fn open(backend: Box<dyn Persistence>) -> Result<Self, StoreError> {
        let accounts = backend.load()?;
        info!("Loaded {} accounts", accounts.len());
        Ok(Self { accounts, backend })
    }

    /// Like [`AccountStore::open`], but an unreadable store starts empty
    ///
    /// The next successful write replaces whatever was on disk.
    pub fn open_or_empty(backend: Box<dyn Persistence>) -> Self {
        match backend.load() {
            Ok(accounts) => {
                info!("Loaded {} accounts", accounts.len());
                Self { accounts, backend }
            }
            Err(e) => {
                error!("Error loading account store, starting empty: {}", e);
                Self {
                    accounts: AccountMap::new(),
                    backend,
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn find_by_credentials(&self, username: &str, password_hash: &str) -> Option<AccountId> {
        self.accounts
            .iter()
            .find(|(_, record)| {
                record.username == username && record.password_hash == password_hash
            })
            .map(|(id, _)| id.clone())
    }

    pub fn username_exists(&self, username: &str) -> bool {
        self.accounts.values().any(|record| record.username == username)
    }

    pub fn username_of(&self, id: &str) -> Option<&str> {
        self.accounts.get(id).map(|record| record.username.as_str())
    }

    /// Creates a new account with the next sequential id
    pub fn create(&mut self, username: &str, password_hash: &str) -> Result<AccountId, StoreError> {
        if self.username_exists(username) {
            return Err(StoreError::UsernameTaken(username.to_string()));
        }

        let mut next = self.accounts.len() + 1;
        while self.accounts.contains_key(&next.to_string()) {
            next += 1;
        }
        let id = next.to_string();

        self.accounts
            .insert(id.clone(), AccountRecord::new(username, password_hash));
        self.persist();
        Ok(id)
    }

    /// Bumps the login counter and returns the new value
    pub fn increment_login_count(&mut self, id: &str) -> Result<u64, StoreError> {
        let record = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownAccount(id.to_string()))?;
        record.login_count += 1;
        let count = record.login_count;
        self.persist();
        Ok(count)
    }

    pub fn login_count(&self, id: &str) -> Option<u64> {
        self.accounts.get(id).map(|record| record.login_count)
    }

    pub fn get_stats(&self, id: &str) -> Option<StatBlock> {
        self.accounts.get(id).and_then(|record| record.stats)
    }

    pub fn set_stats(&mut self, id: &str, stats: StatBlock) -> Result<(), StoreError> {
        let record = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownAccount(id.to_string()))?;
        record.stats = Some(stats);
        self.persist();
        Ok(())
    }

    fn persist(&mut self) {
        // Memory keeps the change; the next successful save catches up.
        if let Err(e) = self.backend.save(&self.accounts) {
            error!("Failed to persist account store: {}", e);
        }
    }
}
