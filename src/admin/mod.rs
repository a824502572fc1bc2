/// Admin and Moderation System
///
/// Handles role-gated moderation of agent listings, reviews and user
/// accounts, together with the append-only audit trail of every admin action.

pub mod audit;
pub mod moderation;
pub mod notifications;
pub mod resources;
pub mod roles;

pub use audit::{AuditFilter, AuditLog, AuditLogEntry, AuditPage, AuditRecord};
pub use moderation::{
    ActionOutcome, ActionParams, ActionRequest, BulkActionRequest, BulkCancellation,
    BulkItemResult, BulkItemStatus, BulkResult, ModerationManager,
};
pub use notifications::{Notification, NotificationManager, NotificationParams, Severity};
pub use resources::{
    AccountStatus, AgentStatus, ModerationAction, ResourceStatus, ResourceType, ReviewStatus,
};
pub use roles::{AdminRoleManager, Role, RoleAssignment};

use serde::{Deserialize, Serialize};

/// Authenticated caller of an admin operation, with the request context
/// recorded alongside each audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_request_context(
        mut self,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}
