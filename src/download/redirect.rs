//! Redirect resolution with a fixed budget.
//!
//! The HTTP client follows same-scheme redirects itself but not ones that
//! switch between `http` and `https`. Those are resolved here by closing the
//! connection and reconnecting to the new location, spending one unit of the
//! budget per reconnect. An exhausted budget is not a failure: the last
//! connection reached is handed back for the download attempt.

use super::connection::{Connection, Connector};
use crate::error::Result;
use url::Url;

/// Redirects followed by default before settling on the last connection.
pub const MAX_REDIRECTS: u32 = 6;

/// Outcome of [`resolve_redirects`].
#[derive(Debug)]
pub struct Resolved<C> {
    /// Connection to download from
    pub connection: C,
    /// Budget left after manual reconnects
    pub remaining_redirects: u32,
}

/// 301, 302 and 303 trigger redirect handling.
pub fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303)
}

/// Opens `url` and resolves cross-scheme redirects, at most `budget` times.
///
/// The scheme of a redirect target is not checked here. A connector built
/// with [`DownloaderConfig::https_only`](super::DownloaderConfig::https_only)
/// fails the reconnect to an `http` target, so the download errors instead of
/// downgrading.
///
/// # Arguments
///
/// * `connector` - Opens each connection
/// * `url` - Initial download URL
/// * `budget` - Maximum manual reconnects
///
/// # Returns
///
/// * `Ok(Resolved)` - The final connection, possibly still a redirect when the budget ran out
/// * `Err` - A connection failed or a `Location` header is not a valid URL
pub async fn resolve_redirects<K: Connector>(
    connector: &K,
    url: Url,
    budget: u32,
) -> Result<Resolved<K::Conn>> {
    let mut url = url;
    let mut remaining = budget;

    loop {
        let connection = connector.open(&url).await?;
        if !is_redirect(connection.status()) {
            return Ok(Resolved {
                connection,
                remaining_redirects: remaining,
            });
        }

        if remaining == 0 {
            log::debug!(
                "Redirect budget exhausted, downloading from {}",
                connection.url()
            );
            return Ok(Resolved {
                connection,
                remaining_redirects: 0,
            });
        }

        let Some(location) = connection.header("location") else {
            return Ok(Resolved {
                connection,
                remaining_redirects: remaining,
            });
        };
        let moved = connection.url().join(&location)?;

        if moved.scheme() == connection.url().scheme() {
            // The client stopped following same-scheme redirects on its own.
            return Ok(Resolved {
                connection,
                remaining_redirects: remaining,
            });
        }

        log::debug!(
            "Redirect across schemes {} -> {}, reconnecting",
            connection.url(),
            moved
        );
        drop(connection);
        remaining -= 1;
        url = moved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DistributeError;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FakeConnection {
        url: Url,
        status: u16,
        location: Option<String>,
    }

    impl Connection for FakeConnection {
        fn status(&self) -> u16 {
            self.status
        }

        fn url(&self) -> &Url {
            &self.url
        }

        fn header(&self, name: &str) -> Option<String> {
            (name == "location").then(|| self.location.clone()).flatten()
        }

        fn content_length(&self) -> Option<u64> {
            None
        }

        async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
            Ok(None)
        }
    }

    /// Serves scripted `(status, location)` pairs and records every URL opened.
    #[derive(Default)]
    struct ScriptedConnector {
        routes: HashMap<String, (u16, Option<String>)>,
        opened: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedConnector {
        fn redirect(mut self, from: &str, to: &str) -> Self {
            self.routes
                .insert(from.to_string(), (302, Some(to.to_string())));
            self
        }

        fn serve(mut self, url: &str) -> Self {
            self.routes.insert(url.to_string(), (200, None));
            self
        }
    }

    impl Connector for ScriptedConnector {
        type Conn = FakeConnection;

        async fn open(&self, url: &Url) -> Result<FakeConnection> {
            self.opened.lock().push(url.to_string());
            let (status, location) = self
                .routes
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| DistributeError::Io(std::io::Error::other("unreachable")))?;
            Ok(FakeConnection {
                url: url.clone(),
                status,
                location,
            })
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    /// Builds a chain alternating schemes: hop 0 is https, hop 1 http, ...
    fn alternating_chain(hops: usize) -> (ScriptedConnector, Vec<String>) {
        let urls: Vec<String> = (0..=hops)
            .map(|i| {
                let scheme = if i % 2 == 0 { "https" } else { "http" };
                format!("{scheme}://hop{i}.example.com/app.pkg")
            })
            .collect();
        let mut connector = ScriptedConnector::default();
        for pair in urls.windows(2) {
            connector = connector.redirect(&pair[0], &pair[1]);
        }
        connector = connector.serve(&urls[hops]);
        (connector, urls)
    }

    #[tokio::test]
    async fn plain_response_needs_no_redirects() {
        let connector = ScriptedConnector::default().serve("https://a.example.com/app.pkg");
        let resolved = resolve_redirects(&connector, url("https://a.example.com/app.pkg"), 6)
            .await
            .unwrap();
        assert_eq!(resolved.connection.status(), 200);
        assert_eq!(resolved.remaining_redirects, 6);
    }

    #[tokio::test]
    async fn cross_scheme_redirect_costs_exactly_one() {
        let connector = ScriptedConnector::default()
            .redirect("https://a.example.com/app.pkg", "http://b.example.com/app.pkg")
            .serve("http://b.example.com/app.pkg");
        let opened = connector.opened.clone();

        let resolved = resolve_redirects(&connector, url("https://a.example.com/app.pkg"), 6)
            .await
            .unwrap();

        assert_eq!(resolved.remaining_redirects, 5);
        assert_eq!(resolved.connection.url().as_str(), "http://b.example.com/app.pkg");
        assert_eq!(opened.lock().len(), 2);
    }

    #[tokio::test]
    async fn short_chain_reaches_terminal_url() {
        let (connector, urls) = alternating_chain(4);
        let resolved = resolve_redirects(&connector, url(&urls[0]), MAX_REDIRECTS)
            .await
            .unwrap();
        assert_eq!(resolved.connection.status(), 200);
        assert_eq!(resolved.connection.url().as_str(), urls[4]);
        assert_eq!(resolved.remaining_redirects, 2);
    }

    #[tokio::test]
    async fn long_chain_settles_on_last_reached_url() {
        let (connector, urls) = alternating_chain(10);
        let opened = connector.opened.clone();

        let resolved = resolve_redirects(&connector, url(&urls[0]), MAX_REDIRECTS)
            .await
            .unwrap();

        assert_eq!(resolved.remaining_redirects, 0);
        assert_eq!(resolved.connection.status(), 302);
        assert_eq!(resolved.connection.url().as_str(), urls[6]);
        assert_eq!(opened.lock().len(), 7);
    }

    #[tokio::test]
    async fn same_scheme_redirect_is_left_to_the_client() {
        let connector = ScriptedConnector::default()
            .redirect("https://a.example.com/app.pkg", "https://b.example.com/app.pkg")
            .serve("https://b.example.com/app.pkg");
        let resolved = resolve_redirects(&connector, url("https://a.example.com/app.pkg"), 6)
            .await
            .unwrap();
        assert_eq!(resolved.connection.status(), 302);
        assert_eq!(resolved.remaining_redirects, 6);
    }
}
