//! Download worker: resolves the connection and streams the body to disk.

use super::connection::{Connection, Connector};
use super::redirect::resolve_redirects;
use super::{DownloadEvent, DownloadMessage, DownloaderConfig};
use crate::error::{DistributeError, ErrorExt, Result};
use crate::release::DownloadProgress;
use path_absolutize::Absolutize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use url::Url;

/// How a download ended without an error.
enum Outcome {
    Completed { path: PathBuf, bytes: u64 },
    Cancelled,
}

pub(super) struct DownloadJob {
    pub id: u64,
    pub url: Url,
    pub download_dir: PathBuf,
    pub file_path: PathBuf,
    pub config: DownloaderConfig,
    pub cancel: CancellationToken,
    pub events: UnboundedSender<DownloadMessage>,
}

impl DownloadJob {
    /// Runs the download to its end and reports the terminal event.
    pub async fn run<K: Connector>(self, connector: Arc<K>) {
        match self.download(connector.as_ref()).await {
            Ok(Outcome::Completed { path, bytes }) => {
                log::debug!("Download {} finished, {} bytes", self.id, bytes);
                match file_uri(&path) {
                    Ok(uri) => self.send(DownloadEvent::Complete { uri, path }),
                    Err(e) => self.fail(e),
                }
            }
            Ok(Outcome::Cancelled) => {
                log::debug!("Download {} cancelled", self.id);
            }
            Err(e) if self.cancel.is_cancelled() => {
                log::debug!("Download {} failed after cancellation: {}", self.id, e);
            }
            Err(e) => self.fail(e),
        }
    }

    async fn download<K: Connector>(&self, connector: &K) -> Result<Outcome> {
        let resolved =
            resolve_redirects(connector, self.url.clone(), self.config.max_redirects).await?;
        let mut connection = resolved.connection;
        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        if connection
            .content_type()
            .is_some_and(|content_type| content_type.contains("text"))
        {
            // Most likely an error page reached through an unresolved redirect.
            return Err(DistributeError::NotAFile);
        }

        fs::create_dir_all(&self.download_dir)
            .await
            .fs_context("creating download directory", &self.download_dir)?;
        match fs::remove_file(&self.file_path).await {
            Ok(()) => log::debug!("Deleted stale artifact {}", self.file_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).fs_context("deleting stale artifact", &self.file_path),
        }

        let total = connection
            .content_length()
            .and_then(|length| i64::try_from(length).ok())
            .unwrap_or(DownloadProgress::UNKNOWN_TOTAL);
        let chunk_size = self.config.chunk_size.max(1);

        let mut file = fs::File::create(&self.file_path)
            .await
            .fs_context("creating artifact", &self.file_path)?;
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(Outcome::Cancelled),
                chunk = connection.next_chunk() => chunk?,
            };
            let Some(chunk) = chunk else {
                break;
            };

            for piece in chunk.chunks(chunk_size) {
                file.write_all(piece)
                    .await
                    .fs_context("writing artifact", &self.file_path)?;
                written += piece.len() as u64;
                if self.cancel.is_cancelled() {
                    return Ok(Outcome::Cancelled);
                }
                log::trace!("Download {}: {} of {} bytes", self.id, written, total);
                self.send(DownloadEvent::Progress(DownloadProgress::new(written, total)));
            }
        }

        file.flush()
            .await
            .fs_context("flushing artifact", &self.file_path)?;
        file.sync_all()
            .await
            .fs_context("syncing artifact", &self.file_path)?;

        if written == 0 {
            return Err(DistributeError::EmptyDownload);
        }
        Ok(Outcome::Completed {
            path: self.file_path.clone(),
            bytes: written,
        })
    }

    fn fail(&self, error: DistributeError) {
        log::error!("Failed to download {}: {}", self.url, error);
        self.send(DownloadEvent::Error(error.to_string()));
    }

    fn send(&self, event: DownloadEvent) {
        let message = DownloadMessage {
            download_id: self.id,
            event,
        };
        if self.events.send(message).is_err() {
            log::debug!("Download {} receiver dropped", self.id);
        }
    }
}

/// `file://` URI of an artifact path.
fn file_uri(path: &std::path::Path) -> Result<Url> {
    let absolute = path
        .absolutize()
        .fs_context("resolving artifact path", path)?;
    Url::from_file_path(&absolute).map_err(|()| {
        DistributeError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("cannot express {} as a file URI", absolute.display()),
        ))
    })
}
