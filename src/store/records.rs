//! Typed access to the workflow keys.
//!
//! The three identity keys (group id, release hash, release id) are written
//! one at a time, so a crash can leave any subset of them behind. Readers
//! here treat a partial set as "no release known" and clear the leftovers.

use super::{
    KEY_DISTRIBUTION_GROUP_ID, KEY_DOWNLOADED_FILE, KEY_RELEASE_HASH, KEY_RELEASE_ID,
    KEY_RELEASE_METADATA, KEY_WORKFLOW_STATE, RecoveryStore, StoreValue, WORKFLOW_KEYS,
};
use crate::error::{DistributeError, Result};
use crate::release::ReleaseDetails;
use std::path::PathBuf;

/// Coarse workflow stage, persisted so the workflow resumes after restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowState {
    #[default]
    Idle,
    Available,
    Downloading,
    Installing,
}

impl WorkflowState {
    /// Integer form written to `workflow-state`.
    pub fn as_i64(self) -> i64 {
        match self {
            WorkflowState::Idle => 0,
            WorkflowState::Available => 1,
            WorkflowState::Downloading => 2,
            WorkflowState::Installing => 3,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(WorkflowState::Idle),
            1 => Some(WorkflowState::Available),
            2 => Some(WorkflowState::Downloading),
            3 => Some(WorkflowState::Installing),
            _ => None,
        }
    }
}

/// Identity of the release handed to the installer, plus where its artifact lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    pub distribution_group_id: String,
    pub release_hash: String,
    pub release_id: i64,
    pub downloaded_file_path: Option<PathBuf>,
}

impl PersistedRecord {
    pub fn from_release(details: &ReleaseDetails, downloaded_file_path: Option<PathBuf>) -> Self {
        Self {
            distribution_group_id: details.distribution_group_id.clone(),
            release_hash: details.release_hash.clone(),
            release_id: details.id,
            downloaded_file_path,
        }
    }

    /// Whether this record refers to `details`.
    pub fn matches(&self, details: &ReleaseDetails) -> bool {
        self.distribution_group_id == details.distribution_group_id
            && self.release_hash == details.release_hash
            && self.release_id == details.id
    }
}

/// Writes the record. The identity triple is written group id, hash, id.
pub fn store_record(store: &dyn RecoveryStore, record: &PersistedRecord) -> Result<()> {
    log::debug!(
        "Stored release details: group id={} release hash={} release id={}",
        record.distribution_group_id,
        record.release_hash,
        record.release_id
    );
    store.put(
        KEY_DISTRIBUTION_GROUP_ID,
        record.distribution_group_id.as_str().into(),
    )?;
    store.put(KEY_RELEASE_HASH, record.release_hash.as_str().into())?;
    store.put(KEY_RELEASE_ID, StoreValue::Int(record.release_id))?;
    if let Some(path) = &record.downloaded_file_path {
        store_downloaded_file(store, path)?;
    }
    Ok(())
}

/// Reads the record, or `None` when any identity key is missing or unreadable.
///
/// A partial identity set is cleared so it cannot half-match a later release.
pub fn load_record(store: &dyn RecoveryStore) -> Option<PersistedRecord> {
    let group = store.get_text(KEY_DISTRIBUTION_GROUP_ID);
    let hash = store.get_text(KEY_RELEASE_HASH);
    let id = store.get_int(KEY_RELEASE_ID);

    match (group, hash, id) {
        (Ok(Some(distribution_group_id)), Ok(Some(release_hash)), Ok(Some(release_id))) => {
            Some(PersistedRecord {
                distribution_group_id,
                release_hash,
                release_id,
                downloaded_file_path: load_downloaded_file(store),
            })
        }
        (Ok(None), Ok(None), Ok(None)) => None,
        _ => {
            log::warn!("Persisted release identity is incomplete, treating release as unknown");
            clear_record(store);
            None
        }
    }
}

/// Removes the identity triple. Failures are logged.
pub fn clear_record(store: &dyn RecoveryStore) {
    for key in [KEY_DISTRIBUTION_GROUP_ID, KEY_RELEASE_HASH, KEY_RELEASE_ID] {
        remove_logged(store, key);
    }
}

pub fn store_downloaded_file(store: &dyn RecoveryStore, path: &std::path::Path) -> Result<()> {
    store.put(
        KEY_DOWNLOADED_FILE,
        StoreValue::Text(path.to_string_lossy().into_owned()),
    )
}

pub fn load_downloaded_file(store: &dyn RecoveryStore) -> Option<PathBuf> {
    store
        .get_text(KEY_DOWNLOADED_FILE)
        .ok()
        .flatten()
        .map(PathBuf::from)
}

pub fn store_workflow_state(store: &dyn RecoveryStore, state: WorkflowState) -> Result<()> {
    log::debug!("Persisting workflow state {:?}", state);
    store.put(KEY_WORKFLOW_STATE, StoreValue::Int(state.as_i64()))
}

/// Reads the persisted state. An unknown discriminant is corruption.
pub fn load_workflow_state(store: &dyn RecoveryStore) -> Result<Option<WorkflowState>> {
    match store.get_int(KEY_WORKFLOW_STATE)? {
        Some(value) => WorkflowState::from_i64(value).map(Some).ok_or_else(|| {
            DistributeError::CorruptedState {
                reason: format!("unknown workflow state {value}"),
            }
        }),
        None => Ok(None),
    }
}

pub fn store_release_metadata(store: &dyn RecoveryStore, details: &ReleaseDetails) -> Result<()> {
    store.put(KEY_RELEASE_METADATA, StoreValue::Text(details.to_json()?))
}

/// Reads the tracked release. Missing metadata is `Ok(None)`, unparsable metadata is an error.
pub fn load_release_metadata(store: &dyn RecoveryStore) -> Result<Option<ReleaseDetails>> {
    match store.get_text(KEY_RELEASE_METADATA)? {
        Some(json) => ReleaseDetails::from_json(&json)
            .map(Some)
            .map_err(|e| DistributeError::CorruptedState {
                reason: format!("release metadata: {e}"),
            }),
        None => Ok(None),
    }
}

/// Removes every workflow key. Failures are logged.
pub fn clear_workflow(store: &dyn RecoveryStore) {
    for key in WORKFLOW_KEYS {
        remove_logged(store, key);
    }
}

pub(crate) fn remove_logged(store: &dyn RecoveryStore, key: &str) {
    if let Err(e) = store.remove(key) {
        log::error!("Failed to remove persisted key {}: {}", key, e);
    }
}
