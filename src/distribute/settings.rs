//! Distributor configuration and its builder.

use crate::download::DownloaderConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default title of the mandatory download indicator.
pub const DEFAULT_INDICATOR_TITLE: &str = "Downloading mandatory update...";

/// Configuration of a [`Distributor`](crate::Distributor).
#[derive(Debug, Clone)]
pub struct DistributeSettings {
    download_dir: PathBuf,
    downloader: DownloaderConfig,
    indicator_title: String,
}

impl Default for DistributeSettings {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            downloader: DownloaderConfig::default(),
            indicator_title: DEFAULT_INDICATOR_TITLE.to_string(),
        }
    }
}

impl DistributeSettings {
    /// Directory the release artifacts are written to.
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn downloader(&self) -> &DownloaderConfig {
        &self.downloader
    }

    pub fn indicator_title(&self) -> &str {
        &self.indicator_title
    }
}

/// `<local data dir>/distribute/downloads`, or a relative fallback.
pub fn default_download_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("distribute")
        .join("downloads")
}

/// Builder for constructing [`DistributeSettings`].
///
/// # Examples
///
/// ```no_run
/// use kodegen_distribute::DistributeSettingsBuilder;
///
/// let settings = DistributeSettingsBuilder::new()
///     .download_dir("/var/lib/myapp/updates")
///     .max_redirects(3)
///     .artifact_extension("AppImage")
///     .build();
/// assert_eq!(settings.downloader().max_redirects, 3);
/// ```
#[derive(Debug, Default)]
pub struct DistributeSettingsBuilder {
    settings: DistributeSettings,
}

impl DistributeSettingsBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the artifact directory.
    ///
    /// Default: [`default_download_dir`]
    pub fn download_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.settings.download_dir = path.as_ref().to_path_buf();
        self
    }

    /// Replaces the whole downloader configuration.
    pub fn downloader(mut self, config: DownloaderConfig) -> Self {
        self.settings.downloader = config;
        self
    }

    /// Sets the redirect budget.
    ///
    /// Default: [`MAX_REDIRECTS`](crate::download::MAX_REDIRECTS)
    pub fn max_redirects(mut self, budget: u32) -> Self {
        self.settings.downloader.max_redirects = budget;
        self
    }

    /// Sets the minimum TLS version.
    ///
    /// Default: TLS 1.2
    pub fn min_tls_version(mut self, version: reqwest::tls::Version) -> Self {
        self.settings.downloader.min_tls_version = version;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.downloader.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.settings.downloader.read_timeout = timeout;
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.settings.downloader.chunk_size = bytes;
        self
    }

    /// Allows plain `http` download URLs. Only meant for local testing.
    pub fn https_only(mut self, https_only: bool) -> Self {
        self.settings.downloader.https_only = https_only;
        self
    }

    pub fn artifact_extension(mut self, extension: impl Into<String>) -> Self {
        self.settings.downloader.artifact_extension = extension.into();
        self
    }

    pub fn indicator_title(mut self, title: impl Into<String>) -> Self {
        self.settings.indicator_title = title.into();
        self
    }

    pub fn build(self) -> DistributeSettings {
        self.settings
    }
}
