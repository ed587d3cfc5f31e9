//! Image download for webhook submissions.
//!
//! Transient failures (timeouts, connection errors, 429/502/503/504) are
//! retried with exponential backoff up to a fixed number of attempts;
//! anything else fails immediately.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::{future::retry_notify, ExponentialBackoff};
use reqwest::{header, Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Errors from fetching a remote image.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("Download failed: {0}")]
    Request(String),

    #[error("Remote server returned status {0}")]
    Status(u16),

    #[error("Image too large: {size} bytes exceeds maximum of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

/// A downloaded image.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// Last path segment of the URL, or `image` when there is none
    pub file_name: String,
}

/// Source of webhook images.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError>;
}

/// Configuration for [`HttpImageFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retries after the first attempt for transient errors
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Maximum accepted body size in bytes
    pub max_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_retries: 2,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(2),
            max_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Fetches images over HTTP(S) with retry and backoff.
pub struct HttpImageFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpImageFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn fetch_once(&self, url: &Url) -> Result<FetchedImage, backoff::Error<FetchError>> {
        let start = Instant::now();

        let mut response = self.client.get(url.clone()).send().await.map_err(|e| {
            let latency_ms = start.elapsed().as_millis() as u64;
            if is_transient_error(&e) {
                warn!(error = %e, latency_ms, "Transient download error, will retry");
                backoff::Error::transient(FetchError::Request(e.to_string()))
            } else {
                warn!(error = %e, latency_ms, "Permanent download error, aborting");
                backoff::Error::permanent(FetchError::Request(e.to_string()))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let err = FetchError::Status(status.as_u16());
            return if is_transient_status(status) {
                warn!(status = %status, "Transient HTTP status, will retry");
                Err(backoff::Error::transient(err))
            } else {
                warn!(status = %status, "Permanent HTTP error");
                Err(backoff::Error::permanent(err))
            };
        }

        let max = self.config.max_bytes;
        if let Some(length) = response.content_length() {
            let size = usize::try_from(length).unwrap_or(usize::MAX);
            if size > max {
                return Err(backoff::Error::permanent(FetchError::TooLarge { size, max }));
            }
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = CappedBody::new(max);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| backoff::Error::transient(FetchError::Request(e.to_string())))?
        {
            body.push(&chunk).map_err(|err| {
                warn!(error = %err, "Download aborted");
                backoff::Error::permanent(err)
            })?;
        }
        let bytes = body.into_bytes();

        debug!(
            size = bytes.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Image downloaded"
        );

        Ok(FetchedImage {
            bytes,
            content_type,
            file_name: file_name_from_url(url),
        })
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            max_elapsed_time: Some(self.config.timeout * (self.config.max_retries + 1)),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let url = parse_image_url(url)?;
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0u32;

        retry_notify(
            self.build_backoff(),
            || {
                attempt += 1;
                let current = attempt;
                let url = &url;
                async move {
                    match self.fetch_once(url).await {
                        Err(backoff::Error::Transient { err, .. }) if current >= max_attempts => {
                            Err(backoff::Error::permanent(err))
                        }
                        other => other,
                    }
                }
            },
            |err: FetchError, duration: Duration| {
                warn!(
                    error = %err,
                    retry_after_ms = duration.as_millis() as u64,
                    "Retry scheduled"
                );
            },
        )
        .await
    }
}

/// Response body buffer that refuses to grow past `max` bytes.
#[derive(Debug)]
struct CappedBody {
    bytes: Vec<u8>,
    max: usize,
}

impl CappedBody {
    fn new(max: usize) -> Self {
        Self {
            bytes: Vec::new(),
            max,
        }
    }

    /// Append `chunk`, or fail with the size the body would have reached.
    fn push(&mut self, chunk: &[u8]) -> Result<(), FetchError> {
        let size = self.bytes.len().saturating_add(chunk.len());
        if size > self.max {
            return Err(FetchError::TooLarge {
                size,
                max: self.max,
            });
        }
        self.bytes.extend_from_slice(chunk);
        Ok(())
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Accept only absolute `http`/`https` URLs.
pub fn parse_image_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUrl(format!(
            "unsupported scheme '{other}'"
        ))),
    }
}

/// Last non-empty path segment of `url`.
pub fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .unwrap_or_else(|| "image".to_string())
}

/// Check if a reqwest error is transient and should be retried.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Check if an HTTP status code indicates a transient error.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one chunked response with no content-length that never ends.
    async fn serve_endless_body() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            let head = "HTTP/1.1 200 OK\r\ncontent-type: image/png\r\ntransfer-encoding: chunked\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let mut frame = format!("{:x}\r\n", 4096).into_bytes();
            frame.extend_from_slice(&[0u8; 4096]);
            frame.extend_from_slice(b"\r\n");
            while socket.write_all(&frame).await.is_ok() {}
        });
        format!("http://{addr}/scans/endless.png")
    }

    /// Serve one chunked response of `len` bytes with no content-length.
    async fn serve_chunked_body(len: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            let mut response = b"HTTP/1.1 200 OK\r\ncontent-type: image/png\r\ntransfer-encoding: chunked\r\n\r\n".to_vec();
            response.extend_from_slice(format!("{len:x}\r\n").as_bytes());
            response.extend(std::iter::repeat(7u8).take(len));
            response.extend_from_slice(b"\r\n0\r\n\r\n");
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/scans/small.png")
    }

    fn capped_fetcher(max_bytes: usize) -> HttpImageFetcher {
        HttpImageFetcher::new(FetchConfig {
            timeout: Duration::from_secs(10),
            max_retries: 0,
            max_bytes,
            ..FetchConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_capped_body_stops_at_limit() {
        let mut body = CappedBody::new(10);
        body.push(b"12345").unwrap();
        body.push(b"67890").unwrap();

        let err = body.push(b"x").unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { size: 11, max: 10 }));
        assert_eq!(body.into_bytes(), b"1234567890");
    }

    #[tokio::test]
    async fn test_fetch_aborts_unbounded_body_without_length() {
        let url = serve_endless_body().await;
        let fetcher = capped_fetcher(64 * 1024);

        let result = tokio::time::timeout(Duration::from_secs(10), fetcher.fetch(&url))
            .await
            .expect("fetch should stop once the cap is exceeded");

        match result {
            Err(FetchError::TooLarge { size, max }) => {
                assert_eq!(max, 64 * 1024);
                assert!(size > max);
            }
            other => panic!("expected TooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_accepts_chunked_body_under_limit() {
        let url = serve_chunked_body(1000).await;
        let fetcher = capped_fetcher(4096);

        let image = fetcher.fetch(&url).await.unwrap();
        assert_eq!(image.bytes.len(), 1000);
        assert_eq!(image.content_type.as_deref(), Some("image/png"));
        assert_eq!(image.file_name, "small.png");
    }

    #[test]
    fn test_parse_image_url() {
        assert!(parse_image_url("https://cdn.example.com/a.png").is_ok());
        assert!(parse_image_url("http://10.0.0.2:8080/scan").is_ok());
        assert!(matches!(
            parse_image_url("file:///etc/passwd"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_image_url("not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_file_name_from_url() {
        let url = Url::parse("https://cdn.example.com/scans/2026/xray-17.jpg?sig=abc").unwrap();
        assert_eq!(file_name_from_url(&url), "xray-17.jpg");

        let url = Url::parse("https://cdn.example.com/").unwrap();
        assert_eq!(file_name_from_url(&url), "image");

        let url = Url::parse("https://cdn.example.com/scans/").unwrap();
        assert_eq!(file_name_from_url(&url), "scans");
    }

    #[test]
    fn test_transient_status() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
    }
}
