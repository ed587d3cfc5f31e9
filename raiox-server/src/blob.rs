//! Blob storage for submitted images.
//!
//! Raw uploads are written to S3-compatible object storage (DigitalOcean
//! Spaces) before ingestion; the returned public URL is recorded on the
//! submitted image. Reachability of the URL is not checked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, PayloadChecksumKind, PercentEncodingMode, SignableBody, SignableRequest,
    SigningParams, SigningSettings, UriPathNormalizationMode,
};
use aws_sigv4::sign::v4;
use dashmap::DashMap;
use reqwest::{header, Client};
use thiserror::Error;
use url::Url;

use crate::config::SpacesConfig;

/// Errors from blob storage backends.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Backend configuration is unusable
    #[error("Invalid blob storage configuration: {0}")]
    InvalidConfig(String),

    /// Upload request could not be completed
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Request could not be signed
    #[error("Request signing failed: {0}")]
    Signing(String),

    /// Backend answered with a non-success status
    #[error("Upload rejected with status {0}")]
    Rejected(u16),
}

/// Destination for raw image bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `object_key` and return its public URL.
    async fn store(
        &self,
        bytes: &[u8],
        object_key: &str,
        content_type: &str,
    ) -> Result<String, BlobError>;

    fn backend(&self) -> &'static str;
}

/// Object key for an uploaded file:
/// `uploads/{client_id}/{submission_id}/{file_name}`.
///
/// Path separators in the file name are dropped so a client cannot write
/// outside its prefix. Submission ids are unique per client, so two uploads
/// with the same file name never share a key.
pub fn object_key(client_id: &str, submission_id: &str, file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or("image");
    format!("uploads/{client_id}/{submission_id}/{base}")
}

const PUBLIC_READ: &str = "public-read";

/// Uploads to an S3-compatible endpoint with SigV4-signed `PUT` requests.
pub struct HttpBlobStore {
    client: Client,
    endpoint: Url,
    config: SpacesConfig,
}

impl HttpBlobStore {
    pub fn new(config: SpacesConfig, timeout: Duration) -> Result<Self, BlobError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| BlobError::InvalidConfig(format!("endpoint '{}': {e}", config.endpoint)))?;
        if endpoint.cannot_be_a_base() || !matches!(endpoint.scheme(), "http" | "https") {
            return Err(BlobError::InvalidConfig(format!(
                "endpoint '{}' is not an http(s) base URL",
                config.endpoint
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BlobError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    /// Path-style object URL: `{endpoint}/{bucket}/{key}`, percent-encoded.
    fn object_url(&self, object_key: &str) -> Result<Url, BlobError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                BlobError::InvalidConfig(format!("endpoint '{}' cannot be a base", self.endpoint))
            })?
            .pop_if_empty()
            .push(&self.config.bucket)
            .extend(object_key.split('/'));
        Ok(url)
    }

    /// SigV4 headers (`authorization`, `x-amz-date`, `x-amz-content-sha256`)
    /// for a `PUT` of `bytes` to `url`.
    fn signing_headers(
        &self,
        url: &Url,
        bytes: &[u8],
        content_type: &str,
        time: SystemTime,
    ) -> Result<Vec<(String, String)>, BlobError> {
        let identity = Credentials::new(
            self.config.access_key.clone(),
            self.config.secret_key.clone(),
            None,
            None,
            "raiox-spaces",
        )
        .into();

        let mut settings = SigningSettings::default();
        settings.percent_encoding_mode = PercentEncodingMode::Single;
        settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
        settings.uri_path_normalization_mode = UriPathNormalizationMode::Disabled;

        let params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.config.region)
            .name("s3")
            .time(time)
            .settings(settings)
            .build()
            .map_err(|e| BlobError::Signing(e.to_string()))?
            .into();

        let signed_headers = [("content-type", content_type), ("x-amz-acl", PUBLIC_READ)];
        let request = SignableRequest::new(
            "PUT",
            url.as_str(),
            signed_headers.into_iter(),
            SignableBody::Bytes(bytes),
        )
        .map_err(|e| BlobError::Signing(e.to_string()))?;

        let (instructions, _signature) = sign(request, &params)
            .map_err(|e| BlobError::Signing(e.to_string()))?
            .into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn store(
        &self,
        bytes: &[u8],
        object_key: &str,
        content_type: &str,
    ) -> Result<String, BlobError> {
        let url = self.object_url(object_key)?;
        let auth = self.signing_headers(&url, bytes, content_type, SystemTime::now())?;

        let mut request = self
            .client
            .put(url)
            .header(header::CONTENT_TYPE, content_type)
            .header("x-amz-acl", PUBLIC_READ)
            .body(bytes.to_vec());
        for (name, value) in auth {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BlobError::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, object_key, "Blob upload rejected");
            return Err(BlobError::Rejected(status.as_u16()));
        }

        tracing::debug!(object_key, size = bytes.len(), "Blob uploaded");
        Ok(self.config.public_url(object_key))
    }

    fn backend(&self) -> &'static str {
        "spaces"
    }
}

/// Keeps blobs in process memory. For development and tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: DashMap<String, (Vec<u8>, String)>,
    fail: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes and content type for `object_key`.
    pub fn get(&self, object_key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.get(object_key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Make every upload fail.
    pub fn set_failure(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(
        &self,
        bytes: &[u8],
        object_key: &str,
        content_type: &str,
    ) -> Result<String, BlobError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BlobError::Upload("memory blob store set to fail".into()));
        }
        self.objects.insert(
            object_key.to_string(),
            (bytes.to_vec(), content_type.to_string()),
        );
        Ok(format!("memory://{object_key}"))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spaces(endpoint: &str) -> SpacesConfig {
        SpacesConfig {
            endpoint: endpoint.into(),
            bucket: "raiox".into(),
            region: "nyc3".into(),
            access_key: "DO00EXAMPLEKEY".into(),
            secret_key: "example-secret".into(),
            public_base_url: None,
        }
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_object_key_strips_paths() {
        assert_eq!(object_key("c1", "s1", "xray.png"), "uploads/c1/s1/xray.png");
        assert_eq!(object_key("c1", "s1", "../../etc/passwd"), "uploads/c1/s1/passwd");
        assert_eq!(object_key("c1", "s1", "C:\\scans\\a.jpg"), "uploads/c1/s1/a.jpg");
        assert_eq!(object_key("c1", "s1", ""), "uploads/c1/s1/image");
        assert_eq!(object_key("c1", "s1", "dir/"), "uploads/c1/s1/image");
    }

    #[test]
    fn test_object_key_is_distinct_per_submission() {
        assert_ne!(
            object_key("c1", "upload_c1_a", "scan.jpg"),
            object_key("c1", "upload_c1_b", "scan.jpg")
        );
    }

    #[tokio::test]
    async fn test_memory_blob_store_roundtrip() {
        let store = MemoryBlobStore::new();
        let url = store
            .store(b"png-bytes", "uploads/c1/s1/a.png", "image/png")
            .await
            .unwrap();

        assert_eq!(url, "memory://uploads/c1/s1/a.png");
        let (bytes, content_type) = store.get("uploads/c1/s1/a.png").unwrap();
        assert_eq!(bytes, b"png-bytes");
        assert_eq!(content_type, "image/png");
    }

    #[tokio::test]
    async fn test_memory_blob_store_failure() {
        let store = MemoryBlobStore::new();
        store.set_failure(true);
        assert!(store.store(b"x", "k", "image/png").await.is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_http_blob_store_rejects_bad_endpoint() {
        for endpoint in ["not a url", "mailto:ops@example.com", "ftp://files.example.com"] {
            assert!(matches!(
                HttpBlobStore::new(spaces(endpoint), Duration::from_secs(5)),
                Err(BlobError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_http_blob_store_object_url() {
        let store =
            HttpBlobStore::new(spaces("https://nyc3.digitaloceanspaces.com/"), Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            store.object_url("uploads/c1/s1/a.png").unwrap().as_str(),
            "https://nyc3.digitaloceanspaces.com/raiox/uploads/c1/s1/a.png"
        );
        assert_eq!(
            store.object_url("uploads/c1/s1/my scan.png").unwrap().as_str(),
            "https://nyc3.digitaloceanspaces.com/raiox/uploads/c1/s1/my%20scan.png"
        );
    }

    #[test]
    fn test_signing_headers_follow_sigv4_for_s3() {
        let store =
            HttpBlobStore::new(spaces("https://nyc3.digitaloceanspaces.com"), Duration::from_secs(5))
                .unwrap();
        let url = store.object_url("uploads/c1/s1/a.png").unwrap();
        // 2026-01-01T00:00:00Z
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_767_225_600);

        let headers = store
            .signing_headers(&url, b"png-bytes", "image/png", time)
            .unwrap();

        let authorization = header(&headers, "authorization").unwrap();
        assert!(authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=DO00EXAMPLEKEY/20260101/nyc3/s3/aws4_request"
        ));
        assert!(authorization.contains("x-amz-acl"));
        assert!(authorization.contains("content-type"));
        assert!(!authorization.contains("example-secret"));
        assert_eq!(header(&headers, "x-amz-date"), Some("20260101T000000Z"));
        assert_eq!(header(&headers, "x-amz-content-sha256").map(str::len), Some(64));
    }

    #[test]
    fn test_signature_depends_on_secret_and_body() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_767_225_600);
        let signature = |secret: &str, body: &[u8]| {
            let mut config = spaces("https://nyc3.digitaloceanspaces.com");
            config.secret_key = secret.into();
            let store = HttpBlobStore::new(config, Duration::from_secs(5)).unwrap();
            let url = store.object_url("uploads/c1/s1/a.png").unwrap();
            let headers = store.signing_headers(&url, body, "image/png", time).unwrap();
            header(&headers, "authorization").unwrap().to_string()
        };

        assert_eq!(signature("one", b"a"), signature("one", b"a"));
        assert_ne!(signature("one", b"a"), signature("two", b"a"));
        assert_ne!(signature("one", b"a"), signature("one", b"b"));
    }
}
