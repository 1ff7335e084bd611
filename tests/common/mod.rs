#![allow(dead_code)]

use bytes::Bytes;
use kodegen_distribute::download::{Connection, Connector};
use kodegen_distribute::store::records;
use kodegen_distribute::{
    DistributeError, DistributeSettingsBuilder, Distributor, DistributorBuilder, ForegroundSurface,
    InstallBackend, InstallRequest, MemoryStore, PersistedRecord, ProgressIndicator,
    ReleaseDetails, Result, TaskQueue,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use url::Url;

pub const MIB: u64 = 1024 * 1024;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn release(id: i64, version: i64, mandatory: bool) -> ReleaseDetails {
    ReleaseDetails {
        distribution_group_id: "group-1".into(),
        release_hash: format!("hash-{id}-{version}"),
        id,
        version,
        short_version: format!("{id}.{version}"),
        download_url: Url::parse(&format!("https://dl.example.com/{id}/{version}/app.pkg"))
            .unwrap(),
        mandatory_update: mandatory,
    }
}

/// A scripted response.
#[derive(Clone)]
pub struct FakeResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub chunks: Vec<Bytes>,
}

impl FakeResponse {
    /// A binary body delivered in `chunk_count` equal chunks.
    pub fn binary(total: usize, chunk_count: usize) -> Self {
        let chunk = Bytes::from(vec![7u8; total / chunk_count]);
        Self {
            status: 200,
            content_type: Some("application/octet-stream".into()),
            content_length: Some(total as u64),
            chunks: vec![chunk; chunk_count],
        }
    }

    pub fn html() -> Self {
        Self {
            status: 200,
            content_type: Some("text/html; charset=utf-8".into()),
            content_length: Some(13),
            chunks: vec![Bytes::from_static(b"<html></html>")],
        }
    }
}

pub struct FakeConnection {
    url: Url,
    response: FakeResponse,
    remaining: VecDeque<Bytes>,
}

impl Connection for FakeConnection {
    fn status(&self) -> u16 {
        self.response.status
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn header(&self, name: &str) -> Option<String> {
        match name {
            "content-type" => self.response.content_type.clone(),
            _ => None,
        }
    }

    fn content_length(&self) -> Option<u64> {
        self.response.content_length
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        tokio::task::yield_now().await;
        Ok(self.remaining.pop_front())
    }
}

/// Serves scripted responses by URL; unknown URLs fail to connect.
#[derive(Clone, Default)]
pub struct FakeConnector {
    routes: Arc<Mutex<HashMap<String, FakeResponse>>>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn serve(&self, url: &Url, response: FakeResponse) {
        self.routes.lock().insert(url.to_string(), response);
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl Connector for FakeConnector {
    type Conn = FakeConnection;

    async fn open(&self, url: &Url) -> Result<FakeConnection> {
        self.opened.lock().push(url.to_string());
        let response = self.routes.lock().get(url.as_str()).cloned().ok_or_else(|| {
            DistributeError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("no route to {url}"),
            ))
        })?;
        Ok(FakeConnection {
            url: url.clone(),
            remaining: response.chunks.iter().cloned().collect(),
            response,
        })
    }
}

/// Records launches and what the store held at launch time.
pub struct FakeInstaller {
    pub resolvable: Mutex<bool>,
    pub fail_launch: Mutex<bool>,
    pub launches: Mutex<Vec<InstallRequest>>,
    pub records_at_launch: Mutex<Vec<Option<PersistedRecord>>>,
    store: MemoryStore,
}

impl FakeInstaller {
    pub fn new(store: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            resolvable: Mutex::new(true),
            fail_launch: Mutex::new(false),
            launches: Mutex::new(Vec::new()),
            records_at_launch: Mutex::new(Vec::new()),
            store,
        })
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().len()
    }
}

impl InstallBackend for FakeInstaller {
    fn resolves(&self, _request: &InstallRequest) -> bool {
        *self.resolvable.lock()
    }

    fn launch(&self, request: &InstallRequest) -> Result<()> {
        if *self.fail_launch.lock() {
            return Err(DistributeError::Launch {
                program: "fake".into(),
                reason: "refused".into(),
            });
        }
        self.records_at_launch
            .lock()
            .push(records::load_record(&self.store));
        self.launches.lock().push(request.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeIndicator {
    pub shown: Mutex<bool>,
    pub indeterminate: Mutex<bool>,
    pub max: Mutex<Option<u64>>,
    pub positions: Mutex<Vec<u64>>,
}

impl ProgressIndicator for FakeIndicator {
    fn set_indeterminate(&self, indeterminate: bool) {
        *self.indeterminate.lock() = indeterminate;
    }

    fn set_max(&self, max: u64) {
        *self.max.lock() = Some(max);
    }

    fn set_progress(&self, position: u64) {
        self.positions.lock().push(position);
    }

    fn show(&self) {
        *self.shown.lock() = true;
    }

    fn hide(&self) {
        *self.shown.lock() = false;
    }
}

/// Surface handing out a fresh recording indicator each time.
#[derive(Default)]
pub struct FakeSurface {
    pub indicators: Mutex<Vec<Arc<FakeIndicator>>>,
}

impl FakeSurface {
    pub fn created(&self) -> usize {
        self.indicators.lock().len()
    }

    pub fn last(&self) -> Option<Arc<FakeIndicator>> {
        self.indicators.lock().last().cloned()
    }
}

impl ForegroundSurface for FakeSurface {
    fn create_progress_indicator(&self, _title: &str) -> Arc<dyn ProgressIndicator> {
        let indicator = Arc::new(FakeIndicator::default());
        self.indicators.lock().push(indicator.clone());
        indicator
    }
}

/// Everything a workflow test needs, sharing one store across "restarts".
pub struct Harness {
    pub store: MemoryStore,
    pub ui: Arc<TaskQueue>,
    pub connector: FakeConnector,
    pub installer: Arc<FakeInstaller>,
    pub surface: Arc<FakeSurface>,
    pub download_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        init_logging();
        let store = MemoryStore::new();
        Self {
            installer: FakeInstaller::new(store.clone()),
            store,
            ui: TaskQueue::new(),
            connector: FakeConnector::default(),
            surface: Arc::new(FakeSurface::default()),
            download_dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Builds a distributor over the shared store, as a freshly started process would.
    pub fn distributor(&self) -> Distributor<FakeConnector> {
        let settings = DistributeSettingsBuilder::new()
            .download_dir(self.download_dir.path())
            .chunk_size(MIB as usize)
            .build();
        DistributorBuilder::new(Arc::new(self.store.clone()), self.ui.clone())
            .settings(settings)
            .installer(self.installer.clone())
            .build_with_connector(self.connector.clone())
            .unwrap()
    }

    pub fn surface(&self) -> Arc<dyn ForegroundSurface> {
        self.surface.clone()
    }

    pub fn artifact(&self, details: &ReleaseDetails) -> std::path::PathBuf {
        self.download_dir
            .path()
            .join(format!("{}.pkg", details.release_hash))
    }

    pub fn artifact_exists(&self, details: &ReleaseDetails) -> bool {
        Path::new(&self.artifact(details)).exists()
    }
}
