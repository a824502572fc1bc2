//! Fixtures shared by unit tests

use crate::admin::{
    AdminRoleManager, AuditLog, ModerationManager, NotificationManager, Principal, Role,
};
use crate::config::{AuditConfig, ModerationConfig};
use crate::db::{open_in_memory, RetryPolicy};
use crate::directory::{DirectoryStore, NewAgentListing};
use chrono::Utc;
use sqlx::SqlitePool;

pub(crate) struct Fixture {
    pub db: SqlitePool,
    pub directory: DirectoryStore,
    pub audit: AuditLog,
    pub moderation: ModerationManager,
    pub notifications: NotificationManager,
}

pub(crate) async fn fixture() -> Fixture {
    let db = open_in_memory().await.unwrap();
    let roles = AdminRoleManager::new(db.clone(), vec![]);

    Fixture {
        directory: DirectoryStore::new(db.clone()),
        audit: AuditLog::new(db.clone(), AuditConfig::default()),
        moderation: ModerationManager::new(
            db.clone(),
            roles,
            ModerationConfig::default(),
            RetryPolicy::none(),
        ),
        notifications: NotificationManager::new(db.clone()),
        db,
    }
}

impl Fixture {
    /// Store a role row directly, bypassing the audited path
    pub async fn principal_with_role(&self, id: &str, role: Role) -> Principal {
        let mut conn = self.db.acquire().await.unwrap();
        AdminRoleManager::set_role_in(&mut conn, id, role, "fixture", Utc::now())
            .await
            .unwrap();
        Principal::new(id)
    }

    pub async fn pending_agent(&self, name: &str) -> String {
        self.directory
            .submit_agent(&NewAgentListing {
                name: name.to_string(),
                description: None,
                category: None,
                website_url: None,
                submitted_by: None,
            })
            .await
            .unwrap()
            .id
    }

    pub async fn profile(&self, username: &str) -> String {
        self.directory
            .register_profile(username, None)
            .await
            .unwrap()
            .id
    }
}
