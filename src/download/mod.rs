//! Background artifact download.
//!
//! [`ReleaseDownloader::start`] spawns one worker task per download. The
//! worker never touches distributor state: it posts [`DownloadMessage`]s on
//! a channel that the distributor drains on its owning thread.
//!
//! For one download, progress messages carry non-decreasing byte counts and
//! at most one terminal message (complete or error) is sent, always last.
//! A cancelled download sends nothing further.
//!
//! # Module Organization
//!
//! - [`connection`] - [`Connector`]/[`Connection`] seam and [`HttpConnector`]
//! - [`redirect`] - budgeted cross-scheme redirect resolution
//! - `worker` - streaming the body to disk

pub mod connection;
pub mod redirect;
mod worker;

pub use connection::{Connection, Connector, HttpConnection, HttpConnector};
pub use redirect::{MAX_REDIRECTS, Resolved, resolve_redirects};

use crate::release::{DownloadProgress, ReleaseDetails};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Bytes written per progress report.
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Network and streaming options for the downloader.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Manual cross-scheme reconnects before settling (default 6)
    pub max_redirects: u32,
    /// Minimum TLS version accepted (default TLS 1.2)
    pub min_tls_version: reqwest::tls::Version,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Size of the pieces written between progress reports and cancellation checks
    pub chunk_size: usize,
    /// Reject plain `http` URLs, including redirect targets
    ///
    /// With the default `true`, an `https` to `http` redirect is still
    /// reconnected by the resolver, and that reconnect then fails. Downgrades
    /// are refused; only `http` to `https` upgrades can succeed.
    pub https_only: bool,
    /// Extension of the artifact file, named `<release-hash>.<extension>`
    pub artifact_extension: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_redirects: MAX_REDIRECTS,
            min_tls_version: reqwest::tls::Version::TLS_1_2,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            chunk_size: WRITE_BUFFER_SIZE,
            https_only: true,
            artifact_extension: "pkg".to_string(),
        }
    }
}

/// Event reported by a download worker.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// Bytes written so far
    Progress(DownloadProgress),
    /// Artifact fully written; `uri` is the `file://` form of `path`
    Complete { uri: Url, path: PathBuf },
    /// Download failed; the cause has already been logged
    Error(String),
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DownloadEvent::Progress(_))
    }
}

/// A [`DownloadEvent`] tagged with the download it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadMessage {
    pub download_id: u64,
    pub event: DownloadEvent,
}

/// Handle to a running download.
///
/// Dropping the handle does not stop the worker; call [`DownloadHandle::cancel`].
#[derive(Debug)]
pub struct DownloadHandle {
    id: u64,
    file_path: PathBuf,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DownloadHandle {
    /// Identifier carried by every message of this download.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Where the artifact is being written.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Requests cooperative cancellation. No progress is reported afterwards
    /// and no terminal event is guaranteed; a partial file may remain.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns download workers for release artifacts.
pub struct ReleaseDownloader<K: Connector = HttpConnector> {
    connector: Arc<K>,
    config: DownloaderConfig,
    download_dir: PathBuf,
    runtime: Handle,
    next_id: u64,
}

impl<K: Connector> std::fmt::Debug for ReleaseDownloader<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseDownloader")
            .field("config", &self.config)
            .field("download_dir", &self.download_dir)
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl<K: Connector> ReleaseDownloader<K> {
    /// Creates a downloader writing artifacts under `download_dir`.
    ///
    /// # Arguments
    ///
    /// * `connector` - Opens the HTTP connections
    /// * `config` - Redirect budget, chunk size and TLS options
    /// * `download_dir` - Destination directory, created on first download
    /// * `runtime` - Runtime the worker tasks are spawned on
    pub fn new(connector: K, config: DownloaderConfig, download_dir: PathBuf, runtime: Handle) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            download_dir,
            runtime,
            next_id: 1,
        }
    }

    /// Path the artifact of `details` is written to.
    pub fn artifact_path(&self, details: &ReleaseDetails) -> PathBuf {
        self.download_dir.join(format!(
            "{}.{}",
            details.release_hash, self.config.artifact_extension
        ))
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Starts downloading the artifact of `details` in the background.
    ///
    /// Returns immediately. Events for this download are sent on `events`
    /// tagged with [`DownloadHandle::id`].
    pub fn start(
        &mut self,
        details: &ReleaseDetails,
        events: UnboundedSender<DownloadMessage>,
    ) -> DownloadHandle {
        let id = self.next_id;
        self.next_id += 1;

        let file_path = self.artifact_path(details);
        let cancel = CancellationToken::new();
        let job = worker::DownloadJob {
            id,
            url: details.download_url.clone(),
            download_dir: self.download_dir.clone(),
            file_path: file_path.clone(),
            config: self.config.clone(),
            cancel: cancel.clone(),
            events,
        };

        log::debug!(
            "Starting download {} of release {} from {}",
            id,
            details.identity(),
            details.download_url
        );
        let task = self.runtime.spawn(job.run(Arc::clone(&self.connector)));

        DownloadHandle {
            id,
            file_path,
            cancel,
            task,
        }
    }
}
