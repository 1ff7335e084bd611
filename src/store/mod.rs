//! Persisted recovery store.
//!
//! The store holds the handful of keys that let the workflow resume after
//! the process is killed. Every write is durable before the call returns;
//! there is no batching window.
//!
//! # Module Organization
//!
//! - [`file`] - [`FileStore`], a JSON file rewritten atomically on each write
//! - [`memory`] - [`MemoryStore`], a shared in-memory map
//! - [`records`] - typed access to [`WorkflowState`] and [`PersistedRecord`]

mod file;
mod memory;
pub mod records;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use records::{PersistedRecord, WorkflowState};

use crate::error::{DistributeError, Result};
use serde::{Deserialize, Serialize};

/// Distribution group of the release handed to the installer.
pub const KEY_DISTRIBUTION_GROUP_ID: &str = "distribution-group-id";
/// Release hash of the release handed to the installer.
pub const KEY_RELEASE_HASH: &str = "release-hash";
/// Release id of the release handed to the installer.
pub const KEY_RELEASE_ID: &str = "release-id";
/// Local path of the downloaded artifact.
pub const KEY_DOWNLOADED_FILE: &str = "downloaded-file-path";
/// Persisted [`WorkflowState`].
pub const KEY_WORKFLOW_STATE: &str = "workflow-state";
/// JSON form of the tracked [`ReleaseDetails`](crate::ReleaseDetails).
pub const KEY_RELEASE_METADATA: &str = "release-metadata-json";

/// Every key the distributor owns.
pub const WORKFLOW_KEYS: [&str; 6] = [
    KEY_DISTRIBUTION_GROUP_ID,
    KEY_RELEASE_HASH,
    KEY_RELEASE_ID,
    KEY_DOWNLOADED_FILE,
    KEY_WORKFLOW_STATE,
    KEY_RELEASE_METADATA,
];

/// A persisted value. Keys are either string or integer typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Int(i64),
    Text(String),
}

impl From<i64> for StoreValue {
    fn from(value: i64) -> Self {
        StoreValue::Int(value)
    }
}

impl From<String> for StoreValue {
    fn from(value: String) -> Self {
        StoreValue::Text(value)
    }
}

impl From<&str> for StoreValue {
    fn from(value: &str) -> Self {
        StoreValue::Text(value.to_string())
    }
}

/// Durable key-value associations that survive a restart.
///
/// Implementations must make `put` and `remove` durable before returning.
pub trait RecoveryStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: StoreValue) -> Result<()>;

    /// Reads the value under `key`.
    fn get(&self, key: &str) -> Result<Option<StoreValue>>;

    /// Deletes `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Reads a string-typed key.
    fn get_text(&self, key: &str) -> Result<Option<String>> {
        match self.get(key)? {
            Some(StoreValue::Text(text)) => Ok(Some(text)),
            Some(StoreValue::Int(_)) => Err(type_mismatch(key, "text")),
            None => Ok(None),
        }
    }

    /// Reads an integer-typed key.
    fn get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key)? {
            Some(StoreValue::Int(value)) => Ok(Some(value)),
            Some(StoreValue::Text(_)) => Err(type_mismatch(key, "integer")),
            None => Ok(None),
        }
    }
}

fn type_mismatch(key: &str, expected: &str) -> DistributeError {
    DistributeError::Store {
        key: key.to_string(),
        reason: format!("expected {expected} value"),
    }
}
