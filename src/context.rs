/// Application context and dependency injection
use crate::{
    admin::{AdminRoleManager, AuditLog, ModerationManager, NotificationManager},
    config::ServerConfig,
    db::{self, RetryPolicy},
    directory::DirectoryStore,
    error::DirectoryResult,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub directory: Arc<DirectoryStore>,
    // Admin & Moderation
    pub admin_role_manager: Arc<AdminRoleManager>,
    pub moderation_manager: Arc<ModerationManager>,
    pub audit_log: Arc<AuditLog>,
    pub notification_manager: Arc<NotificationManager>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> DirectoryResult<Self> {
        // Validate configuration
        config.validate()?;

        let db = db::create_pool(
            &config.storage.database_path,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..Default::default()
            },
        )
        .await?;

        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        tracing::info!(
            path = %config.storage.database_path.display(),
            "Database ready"
        );

        Ok(Self::from_pool(config, db))
    }

    /// Wire services over an already migrated pool
    pub fn from_pool(config: ServerConfig, db: SqlitePool) -> Self {
        let admin_role_manager = AdminRoleManager::new(
            db.clone(),
            config.authentication.admin_ids.clone(),
        );
        let moderation_manager = ModerationManager::new(
            db.clone(),
            admin_role_manager.clone(),
            config.moderation.clone(),
            RetryPolicy::from_config(&config.storage),
        );
        let audit_log = AuditLog::new(db.clone(), config.audit.clone());

        Self {
            directory: Arc::new(DirectoryStore::new(db.clone())),
            admin_role_manager: Arc::new(admin_role_manager),
            moderation_manager: Arc::new(moderation_manager),
            audit_log: Arc::new(audit_log),
            notification_manager: Arc::new(NotificationManager::new(db.clone())),
            config: Arc::new(config),
            db,
        }
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
