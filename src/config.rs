use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the listing service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Listing policy configuration
    pub listings: ListingConfig,
    /// API configuration
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

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
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

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket name for listing images
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Public URL prefix overriding the default bucket URL (CDN, MinIO)
    pub public_base_url: Option<String>,
    /// Key prefix for every stored image
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// Listing policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    /// Maximum simultaneously active listings (drafts + published) per
    /// non-admin owner
    #[serde(default = "default_max_per_owner")]
    pub max_per_owner: u32,
    /// Images wider than this are scaled down, preserving aspect ratio
    #[serde(default = "default_max_image_width")]
    pub max_image_width: u32,
    /// JPEG re-encode quality (0-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Days a published listing stays live
    #[serde(default = "default_listing_ttl_days")]
    pub listing_ttl_days: i64,
    /// Maximum combined size of all uploaded images in one submission
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
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
    "listing-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
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

fn default_region() -> String {
    "eu-north-1".to_string()
}

fn default_key_prefix() -> String {
    "vehicles".to_string()
}

fn default_max_per_owner() -> u32 {
    10
}

fn default_max_image_width() -> u32 {
    1200
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_listing_ttl_days() -> i64 {
    60
}

fn default_max_upload_bytes() -> usize {
    40 * 1024 * 1024 // 40MB combined per submission
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "listing-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/listings").required(false))
            .add_source(config::File::with_name("/etc/market/listings").required(false))
            // Override with environment variables
            // LISTINGS__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("LISTINGS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get database connection timeout as Duration
    pub fn db_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connect_timeout_secs)
    }

    /// Get database idle timeout as Duration
    pub fn db_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.database.idle_timeout_secs)
    }

    /// Get listing lifetime as a chrono Duration
    pub fn listing_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.listings.listing_ttl_days)
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            max_per_owner: default_max_per_owner(),
            max_image_width: default_max_image_width(),
            jpeg_quality: default_jpeg_quality(),
            listing_ttl_days: default_listing_ttl_days(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_max_per_owner(), 10);
        assert_eq!(default_max_image_width(), 1200);
        assert_eq!(default_jpeg_quality(), 80);
        assert_eq!(default_listing_ttl_days(), 60);
    }

    #[test]
    fn test_listing_config_default() {
        let config = ListingConfig::default();
        assert_eq!(config.max_upload_bytes, 40 * 1024 * 1024);
        assert_eq!(config.listing_ttl_days, 60);
    }
}
