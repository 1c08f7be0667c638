use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the asset service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Object storage configuration
    pub storage: StorageConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Upload and archive limits
    #[serde(default)]
    pub ingestion: IngestionConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Which object store implementation backs the service
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    S3,
    /// Process-local store, for development runs
    Memory,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    /// Bucket holding every asset folder
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Base of the public URLs handed to clients. Derived from bucket and
    /// region when unset.
    pub public_base_url: Option<String>,
    /// Presigned upload URL expiration in seconds
    #[serde(default = "default_presigned_upload_expiry_secs")]
    pub presigned_upload_expiry_secs: u64,
    /// Concurrent deletes while purging a folder
    #[serde(default = "default_delete_concurrency")]
    pub delete_concurrency: usize,
    /// Multipart upload threshold in bytes (5MB default)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// Part size for multipart uploads in bytes (5MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

/// Which metadata store implementation backs the service
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseBackend {
    Postgres,
    Memory,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_backend")]
    pub backend: DatabaseBackend,
    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Limits applied while accepting uploads
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    /// Largest accepted request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Largest archive entry that will be materialized in memory
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
    /// How long a replace may hold an asset before another replace can take it over
    #[serde(default = "default_replace_lease_secs")]
    pub replace_lease_secs: u64,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "asset-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::S3
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_presigned_upload_expiry_secs() -> u64 {
    3600
}

fn default_delete_concurrency() -> usize {
    8
}

fn default_multipart_threshold() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_part_size() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_database_backend() -> DatabaseBackend {
    DatabaseBackend::Postgres
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    200 * 1024 * 1024 // 200MB
}

fn default_max_entry_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_replace_lease_secs() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "asset-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/assets").required(false))
            .add_source(config::File::with_name("/etc/heritage/assets").required(false))
            // Override with environment variables
            // ASSETS__STORAGE__BUCKET -> storage.bucket
            .add_source(
                config::Environment::with_prefix("ASSETS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get presigned upload URL expiry as Duration
    pub fn presigned_upload_expiry(&self) -> Duration {
        Duration::from_secs(self.storage.presigned_upload_expiry_secs)
    }

    /// Get the replace lease as Duration
    pub fn replace_lease(&self) -> Duration {
        Duration::from_secs(self.ingestion.replace_lease_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            max_entry_bytes: default_max_entry_bytes(),
            replace_lease_secs: default_replace_lease_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

impl DatabaseConfig {
    /// Pool acquire timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Pool idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl StorageConfig {
    /// Base used to build public object URLs
    pub fn public_base(&self) -> String {
        match self.public_base_url {
            Some(ref base) => base.trim_end_matches('/').to_string(),
            None => match self.endpoint_url {
                Some(ref endpoint) if self.force_path_style => {
                    format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket)
                }
                _ => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_config() -> StorageConfig {
        StorageConfig {
            backend: StorageBackend::S3,
            bucket: "assets".to_string(),
            region: "eu-west-1".to_string(),
            endpoint_url: None,
            force_path_style: false,
            public_base_url: None,
            presigned_upload_expiry_secs: 3600,
            delete_concurrency: 8,
            multipart_threshold_bytes: default_multipart_threshold(),
            part_size_bytes: default_part_size(),
        }
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_max_upload_bytes(), 200 * 1024 * 1024);
        assert_eq!(default_presigned_upload_expiry_secs(), 3600);
        assert_eq!(default_storage_backend(), StorageBackend::S3);
    }

    #[test]
    fn test_public_base_from_bucket_and_region() {
        let config = storage_config();
        assert_eq!(
            config.public_base(),
            "https://assets.s3.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_public_base_path_style_endpoint() {
        let mut config = storage_config();
        config.endpoint_url = Some("http://localhost:9000/".to_string());
        config.force_path_style = true;
        assert_eq!(config.public_base(), "http://localhost:9000/assets");
    }

    #[test]
    fn test_public_base_override_trims_slash() {
        let mut config = storage_config();
        config.public_base_url = Some("https://cdn.example.org/assets/".to_string());
        assert_eq!(config.public_base(), "https://cdn.example.org/assets");
    }

    #[test]
    fn test_database_timeouts() {
        let config: DatabaseConfig = serde_json::from_str(r#"{"idle_timeout_secs": 30}"#).unwrap();
        assert_eq!(config.idle_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.connect_timeout(),
            Duration::from_secs(default_connect_timeout_secs())
        );
    }

    #[test]
    fn test_backend_names() {
        let backend: StorageBackend = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(backend, StorageBackend::Memory);
        let backend: DatabaseBackend = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(backend, DatabaseBackend::Postgres);
    }
}
