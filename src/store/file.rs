//! JSON file backed recovery store.

use super::{RecoveryStore, StoreValue};
use crate::error::{ErrorExt, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk layout of the store file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    /// Time of the last durable write
    updated_at: Option<DateTime<Utc>>,
    values: BTreeMap<String, StoreValue>,
}

/// Recovery store persisted as a single JSON file.
///
/// Each `put`/`remove` rewrites the file through a sibling temporary file,
/// syncs it and renames it over the original, so a crash leaves either the
/// old or the new contents on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Mutex<StoreFile>,
}

impl FileStore {
    /// Opens the store at `path`, creating parent directories as needed.
    ///
    /// An unreadable or unparsable file is treated as an empty store; the
    /// distributor already treats missing keys as "no release known".
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).fs_context("creating store directory", parent)?;
        }

        let state = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<StoreFile>(&contents) {
                Ok(state) => state,
                Err(e) => {
                    log::warn!(
                        "Ignoring corrupted store file {}: {}",
                        path.display(),
                        e
                    );
                    StoreFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreFile::default(),
            Err(e) => return Err(e).fs_context("reading store file", &path),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time of the last durable write, if any.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().updated_at
    }

    fn flush(&self, state: &mut StoreFile) -> Result<()> {
        state.updated_at = Some(Utc::now());
        let json = serde_json::to_vec_pretty(&*state)?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file =
                fs::File::create(&tmp_path).fs_context("creating store file", &tmp_path)?;
            file.write_all(&json)
                .fs_context("writing store file", &tmp_path)?;
            file.sync_all().fs_context("syncing store file", &tmp_path)?;
        }
        fs::rename(&tmp_path, &self.path).fs_context("replacing store file", &self.path)?;
        Ok(())
    }
}

impl RecoveryStore for FileStore {
    fn put(&self, key: &str, value: StoreValue) -> Result<()> {
        let mut state = self.state.lock();
        state.values.insert(key.to_string(), value);
        self.flush(&mut state)
    }

    fn get(&self, key: &str) -> Result<Option<StoreValue>> {
        Ok(self.state.lock().values.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.values.remove(key).is_none() {
            return Ok(());
        }
        self.flush(&mut state)
    }
}
