//! Upstream connectivity probe.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use tilecache_core::{ConnectivityProbe, SystemError};
use tracing::debug;

/// Deadline for a single probe request.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Returns the URL of the tile fetched by the probe.
pub fn probe_url(server: &str) -> String {
    format!("https://{}/vt/lyrs=s&x=1&y=1&z=1", server)
}

/// Fetches a known tile over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    timeout: Duration,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn client(&self, proxy: Option<&str>) -> Result<reqwest::Client, SystemError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(format!("Tilecache/{}", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .connect_timeout(self.timeout);

        builder = match proxy {
            Some(url) => builder.proxy(
                reqwest::Proxy::https(url)
                    .map_err(|e| SystemError::Http(format!("invalid proxy {}: {}", url, e)))?,
            ),
            None => builder.no_proxy(),
        };

        builder
            .build()
            .map_err(|e| SystemError::Http(e.to_string()))
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self, server: &str, proxy: Option<&str>) -> Result<Duration, SystemError> {
        let client = self.client(proxy)?;
        let url = probe_url(server);
        debug!("Probing {} (proxy: {:?})", url, proxy);

        let begin = Instant::now();
        let response = client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SystemError::Timeout(self.timeout)
            } else {
                SystemError::Http(e.to_string())
            }
        })?;
        let elapsed = begin.elapsed();

        match response.status() {
            StatusCode::OK => Ok(elapsed),
            status => Err(SystemError::Http(format!("{} returned {}", server, status))),
        }
    }
}
