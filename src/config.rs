/// Configuration management for the agent directory service
use crate::error::{DirectoryError, DirectoryResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub moderation: ModerationConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    /// Attempts for a unit of work that hits a transient store failure
    pub retry_attempts: u32,
    /// Initial backoff between retries, doubled each attempt
    pub retry_backoff_ms: u64,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Principal ids treated as admins when no role row exists (comma-separated)
    pub admin_ids: Vec<String>,
}

/// Moderation behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Per-id actions executed concurrently within one bulk request
    pub bulk_concurrency: usize,
    /// Upper bound on ids accepted by a single bulk request
    pub max_bulk_items: usize,
    /// Reject actions must carry a reason
    pub require_rejection_reason: bool,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            bulk_concurrency: 4,
            max_bulk_items: 500,
            require_rejection_reason: true,
        }
    }
}

/// Audit log query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 200,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

/// Parse `key` when set, otherwise use `default`. A value that is set but
/// does not parse is an error.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> DirectoryResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DirectoryError::Validation(format!("Invalid value for {}: {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> DirectoryResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("DIRECTORY_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("DIRECTORY_PORT")
            .unwrap_or_else(|_| "8787".to_string())
            .parse()
            .map_err(|_| DirectoryError::Validation("Invalid port number".to_string()))?;
        let version = env::var("DIRECTORY_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let database_path: PathBuf = env::var("DIRECTORY_DATABASE_PATH")
            .unwrap_or_else(|_| "./data/directory.sqlite".to_string())
            .into();

        let jwt_secret = env::var("DIRECTORY_JWT_SECRET")
            .map_err(|_| DirectoryError::Validation("JWT secret required".to_string()))?;

        // Parse admin ids from comma-separated list
        let admin_ids = env::var("DIRECTORY_ADMIN_IDS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let moderation_defaults = ModerationConfig::default();
        let audit_defaults = AuditConfig::default();

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                database_path,
                max_connections: env_or("DIRECTORY_DATABASE_MAX_CONNECTIONS", 10)?,
                retry_attempts: env_or("DIRECTORY_STORE_RETRY_ATTEMPTS", 3)?,
                retry_backoff_ms: env_or("DIRECTORY_STORE_RETRY_BACKOFF_MS", 50)?,
            },
            authentication: AuthConfig {
                jwt_secret,
                admin_ids,
            },
            moderation: ModerationConfig {
                bulk_concurrency: env_or(
                    "DIRECTORY_BULK_CONCURRENCY",
                    moderation_defaults.bulk_concurrency,
                )?,
                max_bulk_items: env_or(
                    "DIRECTORY_MAX_BULK_ITEMS",
                    moderation_defaults.max_bulk_items,
                )?,
                require_rejection_reason: env_or(
                    "DIRECTORY_REQUIRE_REJECTION_REASON",
                    moderation_defaults.require_rejection_reason,
                )?,
            },
            audit: AuditConfig {
                default_page_size: env_or(
                    "DIRECTORY_AUDIT_PAGE_SIZE",
                    audit_defaults.default_page_size,
                )?,
                max_page_size: env_or(
                    "DIRECTORY_AUDIT_MAX_PAGE_SIZE",
                    audit_defaults.max_page_size,
                )?,
            },
            logging: LoggingConfig {
                level: env::var("DIRECTORY_LOG_LEVEL")
                    .unwrap_or_else(|_| "agent_directory=info,tower_http=debug".to_string()),
                json: env::var("DIRECTORY_LOG_FORMAT")
                    .map(|v| v.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.service.hostname.is_empty() {
            return Err(DirectoryError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(DirectoryError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(DirectoryError::Validation(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        if self.moderation.bulk_concurrency == 0 || self.moderation.max_bulk_items == 0 {
            return Err(DirectoryError::Validation(
                "Bulk concurrency and bulk item limit must be positive".to_string(),
            ));
        }

        if self.audit.default_page_size == 0
            || self.audit.default_page_size > self.audit.max_page_size
        {
            return Err(DirectoryError::Validation(
                "Audit default page size must be between 1 and the max page size".to_string(),
            ));
        }

        Ok(())
    }
}
