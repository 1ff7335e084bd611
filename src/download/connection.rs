//! Connection seam between the download worker and the network.
//!
//! The worker and the redirect resolver only see [`Connector`] and
//! [`Connection`]; [`HttpConnector`] is the reqwest-backed implementation.

use super::DownloaderConfig;
use crate::error::Result;
use bytes::Bytes;
use reqwest::redirect::Policy;
use std::future::Future;
use url::Url;

/// Upper bound on same-scheme redirects the HTTP client follows on its own.
const AUTO_REDIRECT_LIMIT: usize = 20;

/// An open response whose body has not been consumed yet.
pub trait Connection: Send {
    /// HTTP status code.
    fn status(&self) -> u16;

    /// URL the response was finally served from.
    fn url(&self) -> &Url;

    /// First value of header `name`, if present and valid UTF-8.
    fn header(&self, name: &str) -> Option<String>;

    /// Server-declared body length.
    fn content_length(&self) -> Option<u64>;

    /// Next piece of the body, `None` at end of stream.
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    fn content_type(&self) -> Option<String> {
        self.header("content-type")
    }
}

/// Opens connections. One connector is shared by every download of a distributor.
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;

    /// Sends a GET for `url`. Same-scheme redirects may be followed
    /// transparently; cross-scheme redirects must be returned as-is.
    fn open(&self, url: &Url) -> impl Future<Output = Result<Self::Conn>> + Send;
}

/// reqwest-backed connector enforcing a minimum TLS version.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
}

impl HttpConnector {
    /// Builds the HTTP client from the downloader configuration.
    ///
    /// Redirects that keep the scheme are followed by the client; a redirect
    /// that changes scheme stops there so the resolver can reconnect manually.
    pub fn new(config: &DownloaderConfig) -> Result<Self> {
        let policy = Policy::custom(|attempt| {
            let same_scheme = attempt
                .previous()
                .last()
                .is_some_and(|previous| previous.scheme() == attempt.url().scheme());
            if same_scheme && attempt.previous().len() <= AUTO_REDIRECT_LIMIT {
                attempt.follow()
            } else {
                attempt.stop()
            }
        });

        let client = reqwest::Client::builder()
            .min_tls_version(config.min_tls_version)
            .https_only(config.https_only)
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .redirect(policy)
            .build()?;

        Ok(Self { client })
    }
}

/// A [`reqwest::Response`] exposed as a [`Connection`].
#[derive(Debug)]
pub struct HttpConnection {
    response: reqwest::Response,
}

impl Connection for HttpConnection {
    fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    fn url(&self) -> &Url {
        self.response.url()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.response.chunk().await?)
    }
}

impl Connector for HttpConnector {
    type Conn = HttpConnection;

    async fn open(&self, url: &Url) -> Result<HttpConnection> {
        log::debug!("Connecting to {}", url);
        let response = self.client.get(url.clone()).send().await?;
        Ok(HttpConnection { response })
    }
}
