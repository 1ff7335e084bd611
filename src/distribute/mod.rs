//! Release distribution workflow.
//!
//! [`Distributor`] owns the tracked release and moves it through
//! [`WorkflowState`]:
//!
//! ```text
//! Idle --detect_release--> Available --start_download--> Downloading
//! Downloading --error--> Idle
//! Downloading --complete--> Installing (mandatory) | Idle (optional, launched)
//!                         | Available (optional, waiting for trigger_install)
//! any --set_enabled(false)--> Idle
//! ```
//!
//! Every method runs on the thread that owns the distributor. Download
//! workers only post messages; they are applied by
//! [`Distributor::dispatch_pending_events`] or [`Distributor::next_event`].
//!
//! Each transition writes the store before anything externally visible
//! happens, so a new distributor over the same store (a restart) can
//! reconcile from the store alone.

mod builder;
mod settings;

pub use builder::DistributorBuilder;
pub use settings::{
    DEFAULT_INDICATOR_TITLE, DistributeSettings, DistributeSettingsBuilder, default_download_dir,
};

use crate::download::{
    Connector, DownloadEvent, DownloadHandle, DownloadMessage, HttpConnector, ReleaseDownloader,
};
use crate::error::{DistributeError, INSTALLER_NOT_FOUND_MESSAGE};
use crate::install::{InstallRequest, InstallTrigger};
use crate::release::{DownloadProgress, ReleaseDetails, ReleaseIdentity};
use crate::store::records::{self, PersistedRecord, WorkflowState};
use crate::store::{KEY_DOWNLOADED_FILE, RecoveryStore};
use crate::ui::{ForegroundSurface, ProgressBinding};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use url::Url;

/// Callback bringing the host application to the foreground.
pub type ResumeHook = Box<dyn Fn() + Send + Sync>;

/// The release download-and-install state machine.
///
/// Construct it with [`DistributorBuilder`]; one distributor drives one
/// workflow per application.
pub struct Distributor<K: Connector = HttpConnector> {
    settings: DistributeSettings,
    store: Arc<dyn RecoveryStore>,
    downloader: ReleaseDownloader<K>,
    installer: InstallTrigger,
    progress: ProgressBinding,
    events_tx: UnboundedSender<DownloadMessage>,
    events_rx: UnboundedReceiver<DownloadMessage>,
    resume_hook: Option<ResumeHook>,

    enabled: bool,
    state: WorkflowState,
    release: Option<ReleaseDetails>,
    /// Release rejected by the platform installer; only newer ones are accepted.
    blocked: Option<ReleaseIdentity>,
    download: Option<DownloadHandle>,
    downloaded_file: Option<PathBuf>,
    /// Optional install waiting for [`Distributor::trigger_install`].
    pending_install: Option<InstallRequest>,
    foreground: Option<Arc<dyn ForegroundSurface>>,
}

impl<K: Connector> std::fmt::Debug for Distributor<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("enabled", &self.enabled)
            .field("state", &self.state)
            .field("release", &self.release.as_ref().map(ReleaseDetails::identity))
            .field("download", &self.download.as_ref().map(DownloadHandle::id))
            .field("pending_install", &self.pending_install.is_some())
            .field("foreground", &self.foreground.is_some())
            .finish()
    }
}

impl<K: Connector> Distributor<K> {
    fn new(
        settings: DistributeSettings,
        store: Arc<dyn RecoveryStore>,
        downloader: ReleaseDownloader<K>,
        installer: InstallTrigger,
        progress: ProgressBinding,
        resume_hook: Option<ResumeHook>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut distributor = Self {
            settings,
            store,
            downloader,
            installer,
            progress,
            events_tx,
            events_rx,
            resume_hook,
            enabled: true,
            state: WorkflowState::Idle,
            release: None,
            blocked: None,
            download: None,
            downloaded_file: None,
            pending_install: None,
            foreground: None,
        };
        distributor.restore();
        distributor
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// The release the workflow is tracking, if any.
    pub fn release(&self) -> Option<&ReleaseDetails> {
        self.release.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Identifier of the running download.
    pub fn active_download_id(&self) -> Option<u64> {
        self.download.as_ref().map(DownloadHandle::id)
    }

    /// Whether an optional install is waiting for [`Distributor::trigger_install`].
    pub fn has_pending_install(&self) -> bool {
        self.pending_install.is_some()
    }

    pub fn progress(&self) -> &ProgressBinding {
        &self.progress
    }

    pub fn settings(&self) -> &DistributeSettings {
        &self.settings
    }

    /// Offers a newly detected release.
    ///
    /// Accepted only if it supersedes the tracked release (or, when idle, a
    /// release the installer rejected); otherwise a no-op. A superseding
    /// release cancels any download or install block in progress.
    pub fn detect_release(&mut self, details: ReleaseDetails) {
        if !self.enabled {
            log::debug!("Distribution disabled, ignoring release {}", details.identity());
            return;
        }

        if self.state == WorkflowState::Idle {
            if self
                .blocked
                .is_some_and(|blocked| details.identity() <= blocked)
            {
                log::debug!(
                    "Release {} has no installer on this platform, ignoring",
                    details.identity()
                );
                return;
            }
        } else if !details.supersedes(self.release.as_ref()) {
            log::debug!(
                "Release {} does not supersede tracked release, ignoring",
                details.identity()
            );
            return;
        } else {
            log::info!(
                "Release {} supersedes tracked release while {:?}",
                details.identity(),
                self.state
            );
            let superseded = self.outgoing_artifact();
            self.cancel_download();
            self.progress.detach();
            self.pending_install = None;
            self.downloaded_file = None;
            if let Some(path) = superseded {
                delete_artifact(&path);
            }
            records::clear_record(self.store.as_ref());
            records::remove_logged(self.store.as_ref(), KEY_DOWNLOADED_FILE);
        }

        if let Err(e) = records::store_release_metadata(self.store.as_ref(), &details) {
            log::error!("Failed to persist release metadata: {}", e);
        }
        self.persist_state(WorkflowState::Available);
        log::info!(
            "Release {} ({}) available, mandatory={}",
            details.identity(),
            details.short_version,
            details.mandatory_update
        );
        self.release = Some(details);
        self.blocked = None;
        self.state = WorkflowState::Available;
    }

    /// Starts downloading the tracked release. No-op unless `Available`.
    pub fn start_download(&mut self) {
        if !self.enabled || self.state != WorkflowState::Available {
            log::debug!("Not starting download in state {:?}", self.state);
            return;
        }
        let Some(release) = self.release.clone() else {
            return;
        };

        self.pending_install = None;
        self.persist_state(WorkflowState::Downloading);
        self.state = WorkflowState::Downloading;

        let handle = self.downloader.start(&release, self.events_tx.clone());
        log::info!("Downloading release {} (download {})", release.identity(), handle.id());
        self.download = Some(handle);

        if release.mandatory_update {
            if let Some(surface) = self.foreground.clone() {
                self.progress
                    .attach(surface.as_ref(), self.settings.indicator_title());
            }
        }
    }

    /// The application came to the foreground with `surface` visible.
    ///
    /// A mandatory release still installing (per the persisted record)
    /// re-asserts the blocking indicator; nothing can confirm the install
    /// outcome, so this never leaves `Installing` on its own.
    pub fn on_app_resume(&mut self, surface: Arc<dyn ForegroundSurface>) {
        self.foreground = Some(Arc::clone(&surface));
        if !self.enabled {
            return;
        }
        if self.state != WorkflowState::Idle {
            self.validate_metadata();
        }

        let Some(release) = self.release.clone() else {
            return;
        };
        match self.state {
            WorkflowState::Installing => {
                let record = records::load_record(self.store.as_ref());
                if record.as_ref().is_some_and(|record| record.matches(&release)) {
                    if !self.progress.is_attached() {
                        log::debug!("Release {} still installing, blocking app", release.identity());
                        self.progress
                            .attach(surface.as_ref(), self.settings.indicator_title());
                    }
                } else {
                    log::warn!(
                        "Install record does not match release {}, install must be restarted",
                        release.identity()
                    );
                    records::clear_record(self.store.as_ref());
                    self.persist_state(WorkflowState::Available);
                    self.state = WorkflowState::Available;
                }
            }
            WorkflowState::Downloading if release.mandatory_update => {
                if !self.progress.is_attached() {
                    self.progress
                        .attach(surface.as_ref(), self.settings.indicator_title());
                }
            }
            WorkflowState::Available if self.pending_install.is_some() => {
                log::debug!("Install of release {} waits for user trigger", release.identity());
            }
            _ => {}
        }
    }

    /// The application left the foreground. Detaches the indicator.
    pub fn on_app_pause(&mut self) {
        self.foreground = None;
        self.progress.detach();
    }

    /// Enables or disables distribution.
    ///
    /// Disabling cancels any download, detaches the indicator, clears every
    /// persisted workflow key and returns to `Idle`. Download events that
    /// arrive afterwards are discarded.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            if !self.enabled {
                log::info!("Distribution enabled");
            }
            self.enabled = true;
            return;
        }

        log::info!("Distribution disabled");
        self.enabled = false;
        self.complete_workflow(true);
        self.blocked = None;
        while self.events_rx.try_recv().is_ok() {}
    }

    /// Launches an optional install that was deferred for lack of a foreground surface.
    ///
    /// Returns whether the installer was launched.
    pub fn trigger_install(&mut self) -> bool {
        if !self.enabled || self.state != WorkflowState::Available || self.foreground.is_none() {
            return false;
        }
        let Some(request) = self.pending_install.take() else {
            return false;
        };
        self.launch_install(request)
    }

    /// Brings the host application back to the foreground.
    pub fn resume_app(&self) {
        match &self.resume_hook {
            Some(hook) => hook(),
            None => log::debug!("No resume hook registered"),
        }
    }

    /// The platform reports that download `download_id` completed.
    ///
    /// Applies queued events of the matching download; other ids are ignored.
    pub fn on_download_complete_by_id(&mut self, download_id: u64) {
        if self.active_download_id() == Some(download_id) {
            self.dispatch_pending_events();
        } else {
            log::debug!("Ignoring completion of unknown download {}", download_id);
        }
    }

    /// Applies every download event already queued. Returns how many were applied.
    pub fn dispatch_pending_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.events_rx.try_recv() {
            self.handle_message(message);
            applied += 1;
        }
        applied
    }

    /// Waits for the next event of the running download and applies it.
    ///
    /// Returns `false` without waiting when no download is running.
    pub async fn next_event(&mut self) -> bool {
        if self.download.is_none() {
            return false;
        }
        match self.events_rx.recv().await {
            Some(message) => {
                self.handle_message(message);
                true
            }
            None => false,
        }
    }

    /// Applies events until the running download reports its terminal event.
    pub async fn run_download(&mut self) {
        while self.next_event().await {}
    }

    fn handle_message(&mut self, message: DownloadMessage) {
        if !self.enabled {
            log::debug!("Distribution disabled, dropping download event");
            return;
        }
        if self.active_download_id() != Some(message.download_id) {
            log::debug!("Dropping event of stale download {}", message.download_id);
            return;
        }

        match message.event {
            DownloadEvent::Progress(progress) => self.on_download_progress(progress),
            DownloadEvent::Complete { uri, path } => {
                self.download = None;
                self.on_download_complete(uri, path);
            }
            DownloadEvent::Error(error) => {
                self.download = None;
                self.on_download_error(&error);
            }
        }
    }

    fn on_download_progress(&mut self, progress: DownloadProgress) {
        log::trace!(
            "downloadedBytes={} totalBytes={}",
            progress.current,
            progress.total
        );
        self.progress.update(progress);
    }

    fn on_download_complete(&mut self, uri: Url, path: PathBuf) {
        log::debug!("Download was successful uri={}", uri);
        if let Err(e) = records::store_downloaded_file(self.store.as_ref(), &path) {
            log::error!("Failed to persist downloaded file path: {}", e);
        }
        self.downloaded_file = Some(path);

        let request = InstallTrigger::build_request(&uri);
        if !self.installer.is_resolvable(&request) {
            self.reject_release(INSTALLER_NOT_FOUND_MESSAGE);
            return;
        }

        let mandatory = self
            .release
            .as_ref()
            .is_some_and(|release| release.mandatory_update);
        if mandatory || self.foreground.is_some() {
            self.launch_install(request);
        } else {
            log::info!("No foreground surface, install deferred until triggered");
            self.pending_install = Some(request);
            self.persist_state(WorkflowState::Available);
            self.state = WorkflowState::Available;
        }
    }

    fn on_download_error(&mut self, error: &str) {
        log::error!("Download failed: {}", error);
        self.complete_workflow(true);
    }

    /// Persists the record (and `Installing` for mandatory releases), then launches.
    fn launch_install(&mut self, request: InstallRequest) -> bool {
        let Some(release) = self.release.clone() else {
            return false;
        };

        let record = PersistedRecord::from_release(&release, self.downloaded_file.clone());
        if let Err(e) = records::store_record(self.store.as_ref(), &record) {
            log::error!("Failed to persist install record: {}", e);
        }
        if release.mandatory_update {
            self.persist_state(WorkflowState::Installing);
        }

        match self.installer.launch(&request) {
            Ok(()) => {
                self.on_install_launched(&release);
                true
            }
            Err(e) => {
                log::error!("Failed to launch installer: {}", e);
                records::clear_record(self.store.as_ref());
                self.reject_release(&e.to_string());
                false
            }
        }
    }

    fn on_install_launched(&mut self, release: &ReleaseDetails) {
        if release.mandatory_update {
            log::info!("Mandatory release {} installing", release.identity());
            self.state = WorkflowState::Installing;
        } else {
            log::info!("Optional release {} handed to installer", release.identity());
            self.complete_workflow(false);
        }
    }

    /// The platform cannot install this release: block it until a newer one appears.
    fn reject_release(&mut self, error: &str) {
        self.blocked = self.release.as_ref().map(ReleaseDetails::identity);
        self.on_download_error(error);
    }

    /// Returns to `Idle`, clearing persisted keys and optionally the artifact.
    fn complete_workflow(&mut self, discard_artifact: bool) {
        let artifact = self.outgoing_artifact();

        self.cancel_download();
        self.progress.detach();
        records::clear_workflow(self.store.as_ref());

        if discard_artifact {
            if let Some(path) = artifact {
                delete_artifact(&path);
            }
        }

        self.release = None;
        self.downloaded_file = None;
        self.pending_install = None;
        self.state = WorkflowState::Idle;
    }

    /// Artifact of the running download, or the finished one not yet installed.
    fn outgoing_artifact(&self) -> Option<PathBuf> {
        self.download
            .as_ref()
            .map(|handle| handle.file_path().to_path_buf())
            .or_else(|| self.downloaded_file.clone())
    }

    fn cancel_download(&mut self) {
        if let Some(handle) = self.download.take() {
            log::debug!("Cancelling download {}", handle.id());
            handle.cancel();
        }
    }

    fn persist_state(&self, state: WorkflowState) {
        if let Err(e) = records::store_workflow_state(self.store.as_ref(), state) {
            log::error!("Failed to persist workflow state {:?}: {}", state, e);
        }
    }

    /// Reconciles in-memory state with the store after construction.
    fn restore(&mut self) {
        let state = records::load_workflow_state(self.store.as_ref());
        let metadata = records::load_release_metadata(self.store.as_ref());

        match (state, metadata) {
            (Ok(None), Ok(None)) => {}
            (Ok(Some(WorkflowState::Idle)), _) => records::clear_workflow(self.store.as_ref()),
            (Ok(Some(state)), Ok(Some(release))) => {
                let state = if state == WorkflowState::Downloading {
                    log::debug!("Download of release {} did not survive restart", release.identity());
                    self.persist_state(WorkflowState::Available);
                    WorkflowState::Available
                } else {
                    state
                };
                log::debug!("Restored release {} in state {:?}", release.identity(), state);
                self.downloaded_file = records::load_downloaded_file(self.store.as_ref());
                if state == WorkflowState::Available {
                    self.restore_pending_install();
                }
                self.release = Some(release);
                self.state = state;
            }
            (Err(e), _) | (_, Err(e)) => self.discard_corrupted(&e),
            (Ok(_), Ok(_)) => self.discard_corrupted(&DistributeError::CorruptedState {
                reason: "workflow state and release metadata disagree".to_string(),
            }),
        }
    }

    /// Re-arms a deferred optional install whose artifact is still on disk.
    fn restore_pending_install(&mut self) {
        let Some(path) = self.downloaded_file.take() else {
            return;
        };
        if !path.is_file() {
            log::debug!("Downloaded artifact {} is gone", path.display());
            records::remove_logged(self.store.as_ref(), KEY_DOWNLOADED_FILE);
            return;
        }
        match Url::from_file_path(&path) {
            Ok(uri) => {
                log::debug!("Install of {} waits for user trigger", path.display());
                self.pending_install = Some(InstallTrigger::build_request(&uri));
                self.downloaded_file = Some(path);
            }
            Err(()) => {
                log::warn!("Downloaded artifact {} is not an absolute path", path.display());
                records::remove_logged(self.store.as_ref(), KEY_DOWNLOADED_FILE);
            }
        }
    }

    /// Drops the workflow if the persisted metadata vanished or became unparsable.
    fn validate_metadata(&mut self) {
        match records::load_release_metadata(self.store.as_ref()) {
            Ok(Some(_)) => {}
            Ok(None) => self.discard_corrupted(&DistributeError::CorruptedState {
                reason: "release metadata missing".to_string(),
            }),
            Err(e) => self.discard_corrupted(&e),
        }
    }

    fn discard_corrupted(&mut self, error: &DistributeError) {
        log::warn!("Discarding persisted workflow: {}", error);
        self.cancel_download();
        self.progress.detach();
        records::clear_workflow(self.store.as_ref());
        self.release = None;
        self.downloaded_file = None;
        self.pending_install = None;
        self.state = WorkflowState::Idle;
    }
}

/// Best-effort removal of an artifact that will never be installed.
fn delete_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Deleted artifact {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to delete artifact {}: {}", path.display(), e),
    }
}

impl<K: Connector> Drop for Distributor<K> {
    fn drop(&mut self) {
        if let Some(handle) = self.download.take() {
            handle.cancel();
        }
    }
}
