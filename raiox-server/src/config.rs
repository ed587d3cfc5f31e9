//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;

use raiox_core::{EmbedderConfig, DEFAULT_RESULT_LIMIT};

/// Server configuration loaded from environment variables
#[derive(Clone)]
pub struct Config {
    /// Server port (default: 8000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in MB (default: 50)
    pub body_limit_mb: usize,
    /// Maximum file size per upload in MB (default: 25)
    pub max_file_size_mb: usize,
    /// Request timeout in seconds (default: 60)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// Prefix for catalog and submission routes (default: /api/v1)
    pub api_prefix: String,
    /// PostgreSQL connection string; in-memory store when unset
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 20)
    pub database_max_connections: u32,
    /// Database connection pool minimum connections (default: 2)
    pub database_min_connections: u32,
    /// Number of catalog matches recorded per submission (default: 3)
    pub result_limit: usize,
    /// Embedding backend (default: raster)
    pub embedder: EmbedderConfig,
    /// Maximum concurrent embedding inferences; 1 serializes them (default: 4)
    pub embed_max_concurrency: usize,
    /// Timeout for downloading webhook images in seconds (default: 20)
    pub fetch_timeout_secs: u64,
    /// Retries for transient webhook download failures (default: 2)
    pub fetch_max_retries: u32,
    /// Object storage settings; in-memory blob store when unset
    pub spaces: Option<SpacesConfig>,
}

/// S3-compatible object storage settings (DigitalOcean Spaces)
#[derive(Clone)]
pub struct SpacesConfig {
    /// Upload endpoint, e.g. `https://nyc3.digitaloceanspaces.com`
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Region, used for request signing and public URLs
    pub region: String,
    /// Access key id for SigV4 request signing
    pub access_key: String,
    /// Secret access key for SigV4 request signing
    pub secret_key: String,
    /// Base URL for public object links, overrides the region-derived URL
    pub public_base_url: Option<String>,
}

impl SpacesConfig {
    /// Public URL of an object key.
    pub fn public_url(&self, object_key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), object_key),
            None => format!(
                "https://{}.{}.digitaloceanspaces.com/{}",
                self.bucket, self.region, object_key
            ),
        }
    }
}

impl std::fmt::Debug for SpacesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpacesConfig")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key", &"[REDACTED]")
            .field("secret_key", &"[REDACTED]")
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("allowed_origins", &self.allowed_origins)
            .field("body_limit_mb", &self.body_limit_mb)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .field("timeout_secs", &self.timeout_secs)
            .field("rate_limit_enabled", &self.rate_limit_enabled)
            .field("api_prefix", &self.api_prefix)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("result_limit", &self.result_limit)
            .field("embedder", &self.embedder)
            .field("embed_max_concurrency", &self.embed_max_concurrency)
            .field("spaces", &self.spaces)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_mb: 50,
            max_file_size_mb: 25,
            timeout_secs: 60,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            api_prefix: "/api/v1".to_string(),
            database_url: None,
            database_max_connections: 20,
            database_min_connections: 2,
            result_limit: DEFAULT_RESULT_LIMIT,
            embedder: EmbedderConfig::default(),
            embed_max_concurrency: 4,
            fetch_timeout_secs: 20,
            fetch_max_retries: 2,
            spaces: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or(defaults.host);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let embedder = match env_non_empty("EMBEDDING_BACKEND") {
            Some(name) => EmbedderConfig::from_name(&name).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default embedding backend");
                defaults.embedder.clone()
            }),
            None => defaults.embedder.clone(),
        };

        let result_limit = env_parse::<usize>("RESULT_LIMIT")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.result_limit);

        let embed_max_concurrency = env_parse::<usize>("EMBED_MAX_CONCURRENCY")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.embed_max_concurrency);

        let spaces = match (
            env_non_empty("SPACES_ENDPOINT"),
            env_non_empty("SPACES_BUCKET"),
            env_non_empty("SPACES_KEY"),
            env_non_empty("SPACES_SECRET"),
        ) {
            (Some(endpoint), Some(bucket), Some(access_key), Some(secret_key)) => {
                Some(SpacesConfig {
                    endpoint,
                    bucket,
                    region: env_non_empty("SPACES_REGION").unwrap_or_else(|| "nyc3".to_string()),
                    access_key,
                    secret_key,
                    public_base_url: env_non_empty("SPACES_PUBLIC_BASE_URL"),
                })
            }
            (None, None, None, None) => None,
            _ => {
                tracing::warn!(
                    "Incomplete SPACES_ENDPOINT/SPACES_BUCKET/SPACES_KEY/SPACES_SECRET, blob storage disabled"
                );
                None
            }
        };

        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            host,
            allowed_origins,
            body_limit_mb: env_parse("BODY_LIMIT_MB").unwrap_or(defaults.body_limit_mb),
            max_file_size_mb: env_parse("MAX_FILE_SIZE_MB").unwrap_or(defaults.max_file_size_mb),
            timeout_secs: env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            rate_limit_enabled,
            rate_limit_per_sec: env_parse("RATE_LIMIT_PER_SEC")
                .unwrap_or(defaults.rate_limit_per_sec),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            api_prefix: env_non_empty("API_PREFIX").unwrap_or(defaults.api_prefix),
            database_url: env_non_empty("DATABASE_URL"),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            database_min_connections: env_parse("DATABASE_MIN_CONNECTIONS")
                .unwrap_or(defaults.database_min_connections),
            result_limit,
            embedder,
            embed_max_concurrency,
            fetch_timeout_secs: env_parse("FETCH_TIMEOUT_SECS")
                .unwrap_or(defaults.fetch_timeout_secs),
            fetch_max_retries: env_parse("FETCH_MAX_RETRIES")
                .unwrap_or(defaults.fetch_max_retries),
            spaces,
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// Maximum upload size in bytes
    pub fn max_file_size(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.result_limit, 3);
        assert_eq!(config.api_prefix, "/api/v1");
        assert!(config.database_url.is_none());
        assert!(!config.rate_limit_enabled);
    }

    #[test]
    fn test_spaces_public_url_from_region() {
        let spaces = SpacesConfig {
            endpoint: "https://nyc3.digitaloceanspaces.com".into(),
            bucket: "raiox-images".into(),
            region: "nyc3".into(),
            access_key: "key".into(),
            secret_key: "secret".into(),
            public_base_url: None,
        };
        assert_eq!(
            spaces.public_url("uploads/c1/xray.png"),
            "https://raiox-images.nyc3.digitaloceanspaces.com/uploads/c1/xray.png"
        );
    }

    #[test]
    fn test_spaces_public_url_override() {
        let spaces = SpacesConfig {
            endpoint: "http://localhost:9000".into(),
            bucket: "b".into(),
            region: "local".into(),
            access_key: "key".into(),
            secret_key: "secret".into(),
            public_base_url: Some("https://cdn.example.com/".into()),
        };
        assert_eq!(spaces.public_url("a/b.png"), "https://cdn.example.com/a/b.png");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config {
            database_url: Some("postgres://user:hunter2@db/raiox".into()),
            spaces: Some(SpacesConfig {
                endpoint: "https://nyc3.digitaloceanspaces.com".into(),
                bucket: "b".into(),
                region: "nyc3".into(),
                access_key: "DO00EXAMPLEKEY".into(),
                secret_key: "s3cr3t".into(),
                public_base_url: None,
            }),
            ..Config::default()
        };

        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("s3cr3t"));
        assert!(!debug.contains("DO00EXAMPLEKEY"));
        assert!(debug.contains("[REDACTED]"));
    }
}
