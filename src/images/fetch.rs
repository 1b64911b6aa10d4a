//! Remote image fetching over plain HTTP

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use super::types::{guess_content_type, FetchError, ResolvedImage};

/// Fetches image bytes from a URL
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ResolvedImage, FetchError>;
}

/// reqwest-backed fetcher with a bounded timeout
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("coloring-book-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<ResolvedImage, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Request(format!("{}: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| guess_content_type(path_of(url)));

        let data = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Request(format!("Failed to read body of {}: {}", url, e))
            }
        })?;

        tracing::debug!(url = %url, size = data.len(), content_type = %content_type, "Fetched remote image");

        Ok(ResolvedImage::new(data.to_vec(), content_type))
    }
}

/// URL without query or fragment, for extension sniffing
pub(super) fn path_of(url: &str) -> &str {
    url.split(&['?', '#'][..]).next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_of_strips_query() {
        assert_eq!(path_of("https://x.test/a.png?sig=1#frag"), "https://x.test/a.png");
        assert_eq!(path_of("https://x.test/a.png"), "https://x.test/a.png");
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpFetcher::new(Duration::from_secs(10)).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) on loopback is closed in test environments
        let result = fetcher.fetch("http://127.0.0.1:9/missing.png").await;
        assert!(matches!(
            result,
            Err(FetchError::Request(_)) | Err(FetchError::Timeout(_))
        ));
    }
}
