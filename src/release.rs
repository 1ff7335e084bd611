//! Release metadata and download progress.

use serde::{Deserialize, Serialize};
use url::Url;

/// Ordering key of a release: `(release-id, version-code)`.
///
/// A candidate supersedes the tracked release only when its identity is
/// strictly greater, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseIdentity {
    /// Release identifier assigned by the distribution service
    pub id: i64,
    /// Platform version code of the build
    pub version: i64,
}

impl std::fmt::Display for ReleaseIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.id, self.version)
    }
}

/// A release detected by the external detection logic.
///
/// Immutable once handed to the [`Distributor`](crate::Distributor); it is
/// persisted verbatim as `release-metadata-json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDetails {
    /// Distribution group the release was published to
    pub distribution_group_id: String,
    /// Content identity of the artifact
    pub release_hash: String,
    /// Release identifier
    pub id: i64,
    /// Version code
    pub version: i64,
    /// Human readable version, e.g. `4.5.6`
    pub short_version: String,
    /// Where the artifact is fetched from
    pub download_url: Url,
    /// Whether installation blocks continued app use
    #[serde(default)]
    pub mandatory_update: bool,
}

impl ReleaseDetails {
    /// Returns the `(id, version)` ordering key.
    pub fn identity(&self) -> ReleaseIdentity {
        ReleaseIdentity {
            id: self.id,
            version: self.version,
        }
    }

    /// Whether `self` should replace `tracked`.
    ///
    /// Anything supersedes "no release known".
    pub fn supersedes(&self, tracked: Option<&ReleaseDetails>) -> bool {
        match tracked {
            Some(tracked) => self.identity() > tracked.identity(),
            None => true,
        }
    }

    /// Parses the persisted `release-metadata-json` form.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes to the persisted `release-metadata-json` form.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Bytes received so far for one download.
///
/// `current` never decreases within a download. `total` is the
/// server-declared content length, or [`DownloadProgress::UNKNOWN_TOTAL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub current: u64,
    pub total: i64,
}

impl DownloadProgress {
    /// Sentinel for a response without a content length.
    pub const UNKNOWN_TOTAL: i64 = -1;

    pub fn new(current: u64, total: i64) -> Self {
        Self { current, total }
    }

    /// Total size when the server declared one.
    pub fn known_total(&self) -> Option<u64> {
        u64::try_from(self.total).ok()
    }
}
