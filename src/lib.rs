//! Out-of-store release distribution for applications
//!
//! This library detects, downloads and installs application updates:
//! - Tracks the newest detected release and orders releases by `(id, version)`
//! - Downloads the artifact over HTTPS, resolving cross-scheme redirects
//! - Shows a blocking progress indicator for mandatory releases
//! - Hands the artifact to the platform installer
//! - Persists the workflow so it resumes after the process is killed
//!
//! The entry point is [`Distributor`], built with [`DistributorBuilder`].

pub mod distribute;
pub mod download;
pub mod error;
pub mod install;
pub mod receiver;
pub mod release;
pub mod store;
pub mod ui;

// Re-export commonly used types
pub use distribute::{
    DistributeSettings, DistributeSettingsBuilder, Distributor, DistributorBuilder,
};
pub use download::{DownloadEvent, DownloadMessage, DownloaderConfig, ReleaseDownloader};
pub use error::{DistributeError, Result};
pub use install::{CommandInstaller, InstallBackend, InstallRequest, InstallTrigger};
pub use receiver::{DownloadReceiver, PlatformNotification};
pub use release::{DownloadProgress, ReleaseDetails, ReleaseIdentity};
pub use store::{FileStore, MemoryStore, PersistedRecord, RecoveryStore, StoreValue, WorkflowState};
pub use ui::{ForegroundSurface, ProgressBinding, ProgressIndicator, TaskQueue, UiHandler};
