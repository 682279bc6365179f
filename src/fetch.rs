use std::time::Duration;

use reqwest::header::{CACHE_CONTROL, CONNECTION, COOKIE, PRAGMA};
use tracing::debug;

use crate::error::ShimError;

const USER_AGENT: &str = concat!("ln_shim/", env!("CARGO_PKG_VERSION"));

/// Anything that can turn a page URL into its raw text.
pub trait PageFetcher {
    fn fetch(&self, url: &str) -> Result<String, ShimError>;
}

/// Fetches dashboard pages over HTTPS with the session cookie attached.
///
/// Every call builds its own client and asks for an uncached response on a
/// connection that is closed afterwards; nothing carries over between fetches.
pub struct HttpFetcher {
    cookie: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(session: &str, timeout: Duration) -> Self {
        HttpFetcher {
            cookie: format!("_laptime_session={};", session),
            timeout,
        }
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, ShimError> {
        let transport = |e: reqwest::Error| ShimError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .user_agent(USER_AGENT)
            .build()
            .map_err(transport)?;

        let response = client
            .get(url)
            .header(COOKIE, &self.cookie)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .header(CONNECTION, "close")
            .send()
            .map_err(transport)?;

        let status = response.status();
        debug!(url, status = status.as_u16(), "dashboard responded");
        if status.as_u16() >= 400 {
            return Err(ShimError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().map_err(transport)?;
        if body.trim().is_empty() {
            return Err(ShimError::NoResponse(url.to_string()));
        }
        Ok(body)
    }
}
