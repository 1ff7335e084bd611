//! Builder for constructing a [`Distributor`].

use super::{DistributeSettings, Distributor, ResumeHook};
use crate::download::{Connector, HttpConnector, ReleaseDownloader};
use crate::error::{DistributeError, Result};
use crate::install::{CommandInstaller, InstallBackend, InstallTrigger};
use crate::store::RecoveryStore;
use crate::ui::{ProgressBinding, UiHandler};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Builder for constructing a [`Distributor`].
///
/// The store and the UI handler are required; everything else has a default.
/// Building reconciles the workflow with whatever the store already holds,
/// so building over the store of a previous process resumes its workflow.
///
/// # Examples
///
/// ```no_run
/// use kodegen_distribute::{DistributorBuilder, FileStore, TaskQueue};
/// use std::sync::Arc;
///
/// # async fn example() -> kodegen_distribute::Result<()> {
/// let store = Arc::new(FileStore::open("/var/lib/myapp/distribute.json")?);
/// let ui = TaskQueue::new();
/// let mut distributor = DistributorBuilder::new(store, ui.clone()).build()?;
/// distributor.start_download();
/// # Ok(())
/// # }
/// ```
pub struct DistributorBuilder {
    store: Arc<dyn RecoveryStore>,
    ui: Arc<dyn UiHandler>,
    settings: DistributeSettings,
    installer: Option<Arc<dyn InstallBackend>>,
    runtime: Option<Handle>,
    resume_hook: Option<ResumeHook>,
}

impl DistributorBuilder {
    /// Creates a builder over `store`, posting UI work to `ui`.
    pub fn new(store: Arc<dyn RecoveryStore>, ui: Arc<dyn UiHandler>) -> Self {
        Self {
            store,
            ui,
            settings: DistributeSettings::default(),
            installer: None,
            runtime: None,
            resume_hook: None,
        }
    }

    /// Sets the configuration.
    ///
    /// Default: [`DistributeSettings::default`]
    pub fn settings(mut self, settings: DistributeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the platform install backend.
    ///
    /// Default: [`CommandInstaller::platform_default`]
    pub fn installer(mut self, backend: Arc<dyn InstallBackend>) -> Self {
        self.installer = Some(backend);
        self
    }

    /// Sets the runtime download workers run on.
    ///
    /// Default: the runtime the builder is called from
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Sets the callback used by [`Distributor::resume_app`].
    pub fn on_resume_app<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.resume_hook = Some(Box::new(hook));
        self
    }

    /// Builds a distributor downloading over HTTPS.
    pub fn build(self) -> Result<Distributor> {
        let connector = HttpConnector::new(self.settings.downloader())?;
        self.build_with_connector(connector)
    }

    /// Builds a distributor downloading through `connector`.
    pub fn build_with_connector<K: Connector>(self, connector: K) -> Result<Distributor<K>> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| DistributeError::NoRuntime)?,
        };
        let downloader = ReleaseDownloader::new(
            connector,
            self.settings.downloader().clone(),
            self.settings.download_dir().to_path_buf(),
            runtime,
        );
        let backend = self
            .installer
            .unwrap_or_else(|| Arc::new(CommandInstaller::platform_default()));

        Ok(Distributor::new(
            self.settings,
            self.store,
            downloader,
            InstallTrigger::new(backend),
            ProgressBinding::new(self.ui),
            self.resume_hook,
        ))
    }
}
