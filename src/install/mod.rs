//! Install trigger: builds and launches the platform install request.
//!
//! [`InstallTrigger::build_request`] is a pure function of the artifact URI.
//! Resolving and launching go through an [`InstallBackend`], which the
//! distributor only calls from its download-complete path.

mod command;

pub use command::CommandInstaller;

use crate::error::Result;
use std::sync::Arc;
use url::Url;

/// A request to install the artifact at `file_uri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// `file://` URI of the downloaded artifact
    pub file_uri: Url,
    /// The installer is granted read access to the artifact
    pub grant_read_access: bool,
    /// The installer runs as a fresh top-level task
    pub new_task: bool,
    /// An installer already showing this artifact is reused
    pub single_top: bool,
}

/// Platform side of installation.
pub trait InstallBackend: Send + Sync {
    /// Whether some installer on this platform accepts `request`. No side effects.
    fn resolves(&self, request: &InstallRequest) -> bool;

    /// Starts the installer and returns without waiting for it.
    fn launch(&self, request: &InstallRequest) -> Result<()>;
}

/// Builds install requests and hands them to the platform backend.
#[derive(Clone)]
pub struct InstallTrigger {
    backend: Arc<dyn InstallBackend>,
}

impl std::fmt::Debug for InstallTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallTrigger").finish_non_exhaustive()
    }
}

impl InstallTrigger {
    pub fn new(backend: Arc<dyn InstallBackend>) -> Self {
        Self { backend }
    }

    /// Builds the install request for a downloaded artifact.
    pub fn build_request(file_uri: &Url) -> InstallRequest {
        InstallRequest {
            file_uri: file_uri.clone(),
            grant_read_access: true,
            new_task: true,
            single_top: true,
        }
    }

    pub fn is_resolvable(&self, request: &InstallRequest) -> bool {
        self.backend.resolves(request)
    }

    pub fn launch(&self, request: &InstallRequest) -> Result<()> {
        log::info!("Show install UI now uri={}", request.file_uri);
        self.backend.launch(request)
    }
}
