mod common;

use bytes::Bytes;
use common::{init_logging, release};
use kodegen_distribute::download::{Connection, Connector};
use kodegen_distribute::{DownloadEvent, DownloaderConfig, ReleaseDownloader, Result};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use url::Url;

/// Body chunks arrive only when the test sends them.
struct GatedConnection {
    url: Url,
    chunks: UnboundedReceiver<Bytes>,
}

impl Connection for GatedConnection {
    fn status(&self) -> u16 {
        200
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn header(&self, name: &str) -> Option<String> {
        (name == "content-type").then(|| "application/octet-stream".to_string())
    }

    fn content_length(&self) -> Option<u64> {
        Some(4096)
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.chunks.recv().await)
    }
}

struct GatedConnector {
    chunks: Mutex<Option<UnboundedReceiver<Bytes>>>,
}

impl GatedConnector {
    fn new() -> (Self, UnboundedSender<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            chunks: Mutex::new(Some(rx)),
        };
        (connector, tx)
    }
}

impl Connector for GatedConnector {
    type Conn = GatedConnection;

    async fn open(&self, url: &Url) -> Result<GatedConnection> {
        let chunks = self
            .chunks
            .lock()
            .take()
            .ok_or_else(|| std::io::Error::other("body already taken"))?;
        Ok(GatedConnection {
            url: url.clone(),
            chunks,
        })
    }
}

#[tokio::test]
async fn cancelled_download_goes_silent_and_keeps_partial_file() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let details = release(3, 2, false);
    let (connector, body) = GatedConnector::new();
    let config = DownloaderConfig {
        chunk_size: 4096,
        ..DownloaderConfig::default()
    };
    let mut downloader = ReleaseDownloader::new(
        connector,
        config,
        dir.path().to_path_buf(),
        tokio::runtime::Handle::current(),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = downloader.start(&details, tx);

    body.send(Bytes::from(vec![1u8; 1024])).unwrap();
    let first = rx.recv().await.unwrap();
    assert_eq!(first.download_id, handle.id());
    let DownloadEvent::Progress(progress) = first.event else {
        panic!("expected progress, got {:?}", first.event);
    };
    assert_eq!(progress.current, 1024);

    handle.cancel();
    assert!(handle.is_cancelled());
    // Whatever still arrives after the cancel must not be reported.
    let _ = body.send(Bytes::from(vec![2u8; 1024]));
    drop(body);

    // The channel closes once the worker exits; nothing is sent before that.
    let next = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert!(next.is_none(), "worker reported {next:?} after cancellation");
    assert!(handle.is_finished());

    // The last buffered write may still be landing on the blocking pool.
    let mut written = 0;
    for _ in 0..500 {
        written = std::fs::metadata(handle.file_path()).unwrap().len();
        if written >= 1024 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(written >= 1024, "partial file holds {written} bytes");
    assert!(written < 4096);
}
