//! Configuration management for the coloring book server

use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub resolver: ResolverConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub endpoint: String,
    /// Bucket that receives finished books
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
    /// Key prefix for finished books inside `bucket`
    pub artifact_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Minio,
    R2,
    S3,
    B2,
    /// Process-local store, for development without an S3 endpoint
    Memory,
}

impl StorageProvider {
    /// AWS proper uses virtual-hosted addressing; everything else here is path-style.
    pub fn uses_path_style(&self) -> bool {
        !matches!(self, StorageProvider::S3)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Timeout for the HTTP fallback fetch
    pub fetch_timeout_secs: u64,
    /// Retry storage misses over plain HTTP
    pub http_fallback: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Maximum jobs composing at once (0 = unlimited)
    pub max_concurrent: usize,
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            storage: StorageConfig {
                provider: StorageProvider::Minio,
                endpoint: "http://localhost:9000".to_string(),
                bucket: "coloring-books".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password123".to_string(),
                region: Some("us-east-1".to_string()),
                artifact_prefix: "books".to_string(),
            },
            resolver: ResolverConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 10,
            http_fallback: true,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            queue_capacity: 64,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let provider = match env::var("S3_PROVIDER")
            .unwrap_or_else(|_| "minio".to_string())
            .to_lowercase()
            .as_str()
        {
            "r2" => StorageProvider::R2,
            "s3" => StorageProvider::S3,
            "b2" => StorageProvider::B2,
            "memory" => StorageProvider::Memory,
            _ => StorageProvider::Minio,
        };

        // Credentials are only mandatory when a real endpoint is used.
        let (access_key, secret_key) = match provider {
            StorageProvider::Memory => (
                env::var("S3_ACCESS_KEY").unwrap_or_default(),
                env::var("S3_SECRET_KEY").unwrap_or_default(),
            ),
            _ => (env::var("S3_ACCESS_KEY")?, env::var("S3_SECRET_KEY")?),
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 3000),
            },
            storage: StorageConfig {
                provider,
                endpoint: env::var("S3_ENDPOINT")
                    .unwrap_or_else(|_| "http://localhost:9000".to_string()),
                bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "coloring-books".to_string()),
                access_key,
                secret_key,
                region: Some(env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string())),
                artifact_prefix: env::var("ARTIFACT_PREFIX").unwrap_or_else(|_| "books".to_string()),
            },
            resolver: ResolverConfig {
                fetch_timeout_secs: parse_var("IMAGE_FETCH_TIMEOUT_SECS", 10),
                http_fallback: parse_var("IMAGE_HTTP_FALLBACK", true),
            },
            jobs: JobsConfig {
                max_concurrent: parse_var("MAX_CONCURRENT_JOBS", 0),
                queue_capacity: parse_var("JOB_QUEUE_CAPACITY", 64).max(1),
            },
        })
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
