//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::storage::StorageConfig;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/mcr";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "*";

// ============================================================================
// Packaging Constants
// ============================================================================

/// Files downloaded concurrently per batch.
pub const DEFAULT_DOWNLOAD_BATCH_SIZE: usize = 50;

/// Aggregate download ceiling per package (1.5 GiB).
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 1536 * 1024 * 1024;

/// Base per-file download timeout (2 minutes).
pub const DEFAULT_BASE_TIMEOUT_MS: u64 = 120_000;

/// Extra per-file timeout per started MiB.
pub const DEFAULT_TIMEOUT_PER_MB_MS: u64 = 1_000;

/// Revisions handled per migration batch.
pub const DEFAULT_MIGRATION_BATCH_SIZE: usize = 10;

/// Migration wall-clock budget (13 minutes).
pub const DEFAULT_MIGRATION_MAX_RUNTIME_MS: u64 = 13 * 60 * 1000;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub storage: StorageConfig,
    pub zips: ZipConfig,
    pub migration: MigrationConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Zip packaging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZipConfig {
    /// Parent of the per-invocation staging directories
    pub staging_dir: PathBuf,
    pub download_batch_size: usize,
    pub max_total_bytes: u64,
    pub base_timeout_ms: u64,
    pub timeout_per_mb_ms: u64,
}

/// Backfill migration defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub batch_size: usize,
    pub max_runtime_ms: u64,
}

impl MigrationConfig {
    pub fn max_runtime(&self) -> Duration {
        Duration::from_millis(self.max_runtime_ms)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("MCR_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("MCR_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or(
                    "MCR_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", true),
            },
            storage: StorageConfig::from_env()?,
            zips: ZipConfig {
                staging_dir: std::env::var("ZIP_STAGING_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| std::env::temp_dir()),
                download_batch_size: env_or(
                    "ZIP_DOWNLOAD_BATCH_SIZE",
                    DEFAULT_DOWNLOAD_BATCH_SIZE,
                ),
                max_total_bytes: env_or("ZIP_MAX_TOTAL_BYTES", DEFAULT_MAX_TOTAL_BYTES),
                base_timeout_ms: env_or("ZIP_BASE_TIMEOUT_MS", DEFAULT_BASE_TIMEOUT_MS),
                timeout_per_mb_ms: env_or("ZIP_TIMEOUT_PER_MB_MS", DEFAULT_TIMEOUT_PER_MB_MS),
            },
            migration: MigrationConfig {
                batch_size: env_or("ZIP_MIGRATION_BATCH_SIZE", DEFAULT_MIGRATION_BATCH_SIZE),
                max_runtime_ms: env_or(
                    "ZIP_MIGRATION_MAX_RUNTIME_MS",
                    DEFAULT_MIGRATION_MAX_RUNTIME_MS,
                ),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.storage.documents_bucket.is_empty() {
            anyhow::bail!("S3_DOCUMENTS_BUCKET cannot be empty");
        }

        if self.zips.download_batch_size == 0 {
            anyhow::bail!("ZIP_DOWNLOAD_BATCH_SIZE must be greater than 0");
        }

        if self.zips.max_total_bytes == 0 {
            anyhow::bail!("ZIP_MAX_TOTAL_BYTES must be greater than 0");
        }

        if self.migration.batch_size == 0 {
            anyhow::bail!("ZIP_MIGRATION_BATCH_SIZE must be greater than 0");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            storage: StorageConfig {
                endpoint: None,
                region: crate::storage::config::DEFAULT_S3_REGION.to_string(),
                documents_bucket: crate::storage::config::DEFAULT_DOCUMENTS_BUCKET.to_string(),
                access_key: None,
                secret_key: None,
                path_style: false,
            },
            zips: ZipConfig {
                staging_dir: std::env::temp_dir(),
                download_batch_size: DEFAULT_DOWNLOAD_BATCH_SIZE,
                max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
                base_timeout_ms: DEFAULT_BASE_TIMEOUT_MS,
                timeout_per_mb_ms: DEFAULT_TIMEOUT_PER_MB_MS,
            },
            migration: MigrationConfig {
                batch_size: DEFAULT_MIGRATION_BATCH_SIZE,
                max_runtime_ms: DEFAULT_MIGRATION_MAX_RUNTIME_MS,
            },
        }
    }
}
