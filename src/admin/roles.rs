/// Role resolution and authorization
use crate::db::{decode_timestamp, encode_timestamp};
use crate::error::{DirectoryError, DirectoryResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::sync::Arc;

/// Principal role levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account, no moderation rights
    User,
    /// Can review listings and reviews
    Moderator,
    /// Full access, including roles, bans and deletion
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> DirectoryResult<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            _ => Err(DirectoryError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// Check if this role may perform actions requiring another role.
    /// `user` satisfies no requirement, not even its own level.
    pub fn can_act_as(&self, required: Role) -> bool {
        *self != Role::User && *self >= required
    }
}

/// Stored role assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: String,
    pub role: Role,
    pub granted_by: Option<String>,
    pub granted_at: DateTime<Utc>,
}

/// Resolves and checks principal roles
#[derive(Clone)]
pub struct AdminRoleManager {
    db: SqlitePool,
    bootstrap_admins: Arc<HashSet<String>>,
}

impl AdminRoleManager {
    pub fn new(db: SqlitePool, bootstrap_admins: Vec<String>) -> Self {
        Self {
            db,
            bootstrap_admins: Arc::new(bootstrap_admins.into_iter().collect()),
        }
    }

    /// Get the stored role assignment for a principal
    pub async fn get_assignment(&self, user_id: &str) -> DirectoryResult<Option<RoleAssignment>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, role, granted_by, granted_at
            FROM user_roles
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| parse_assignment(&row)).transpose()
    }

    /// Resolve the current role of a principal.
    ///
    /// Always reads the store; callers must not cache the result beyond a
    /// single operation.
    pub async fn resolve_role(&self, principal_id: Option<&str>) -> DirectoryResult<Role> {
        let principal_id = principal_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DirectoryError::NotAuthenticated("No authenticated principal".to_string()))?;

        let stored = self.get_assignment(principal_id).await?.map(|a| a.role);
        Ok(self.effective_role(principal_id, stored))
    }

    fn effective_role(&self, principal_id: &str, stored: Option<Role>) -> Role {
        if let Some(role) = stored {
            return role;
        }

        if self.bootstrap_admins.contains(principal_id) {
            tracing::debug!(principal_id, "Configured admin without role row, resolving as admin");
            return Role::Admin;
        }

        Role::User
    }

    /// Whether the principal currently holds at least `required`
    pub async fn authorize(&self, principal_id: Option<&str>, required: Role) -> DirectoryResult<bool> {
        Ok(self.resolve_role(principal_id).await?.can_act_as(required))
    }

    /// Resolve the principal's role and fail with `PermissionDenied` if it
    /// does not satisfy `required`
    pub async fn require(&self, principal_id: Option<&str>, required: Role) -> DirectoryResult<Role> {
        let role = self.resolve_role(principal_id).await?;
        check_role(principal_id.unwrap_or_default(), role, required)
    }

    /// Same check as [`require`](Self::require), read on an open transaction
    /// so the role and the mutation it guards come from one snapshot
    pub(crate) async fn require_in(
        &self,
        conn: &mut SqliteConnection,
        principal_id: &str,
        required: Role,
    ) -> DirectoryResult<Role> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT role FROM user_roles WHERE user_id = ?")
                .bind(principal_id)
                .fetch_optional(&mut *conn)
                .await?;
        let stored = stored.map(|r| Role::from_str(&r)).transpose()?;

        check_role(principal_id, self.effective_role(principal_id, stored), required)
    }

    /// List all elevated role assignments
    pub async fn list_assignments(&self) -> DirectoryResult<Vec<RoleAssignment>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, role, granted_by, granted_at
            FROM user_roles
            ORDER BY granted_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_assignment).collect()
    }

    /// Stored role of a user inside an open transaction (`user` when no row)
    pub(crate) async fn stored_role_in(
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> DirectoryResult<Role> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;

        role.map(|r| Role::from_str(&r))
            .transpose()
            .map(|r| r.unwrap_or(Role::User))
    }

    /// Replace the user's role inside an open transaction. Assigning `user`
    /// removes the row, since that is the default.
    pub(crate) async fn set_role_in(
        conn: &mut SqliteConnection,
        user_id: &str,
        role: Role,
        granted_by: &str,
        now: DateTime<Utc>,
    ) -> DirectoryResult<()> {
        if role == Role::User {
            sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
                .bind(user_id)
                .execute(&mut *conn)
                .await?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role, granted_by, granted_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                role = excluded.role,
                granted_by = excluded.granted_by,
                granted_at = excluded.granted_at
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(granted_by)
        .bind(encode_timestamp(now))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

fn check_role(principal_id: &str, role: Role, required: Role) -> DirectoryResult<Role> {
    if !role.can_act_as(required) {
        tracing::warn!(
            principal_id,
            role = role.as_str(),
            required = required.as_str(),
            "Permission denied"
        );
        return Err(DirectoryError::PermissionDenied(format!(
            "Requires {} role or higher",
            required.as_str()
        )));
    }
    Ok(role)
}

fn parse_assignment(row: &sqlx::sqlite::SqliteRow) -> DirectoryResult<RoleAssignment> {
    let role_str: String = row.try_get("role")?;
    let granted_at_str: String = row.try_get("granted_at")?;

    Ok(RoleAssignment {
        user_id: row.try_get("user_id")?,
        role: Role::from_str(&role_str)?,
        granted_by: row.try_get("granted_by")?,
        granted_at: decode_timestamp(&granted_at_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn test_role_hierarchy() {
        assert!(Role::Admin > Role::Moderator);
        assert!(Role::Moderator > Role::User);

        assert!(Role::Admin.can_act_as(Role::Admin));
        assert!(Role::Admin.can_act_as(Role::Moderator));
        assert!(Role::Moderator.can_act_as(Role::Moderator));

        assert!(!Role::Moderator.can_act_as(Role::Admin));
        assert!(!Role::User.can_act_as(Role::Moderator));
        assert!(!Role::User.can_act_as(Role::User));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("moderator").unwrap(), Role::Moderator);
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("user").unwrap(), Role::User);
        assert!(Role::from_str("superadmin").is_err());
    }

    #[tokio::test]
    async fn test_resolve_role_defaults() {
        let db = open_in_memory().await.unwrap();
        let manager = AdminRoleManager::new(db, vec!["root".to_string()]);

        assert!(matches!(
            manager.resolve_role(None).await,
            Err(DirectoryError::NotAuthenticated(_))
        ));
        assert_eq!(manager.resolve_role(Some("nobody")).await.unwrap(), Role::User);
        assert_eq!(manager.resolve_role(Some("root")).await.unwrap(), Role::Admin);
    }

    #[tokio::test]
    async fn test_assignment_supersedes_previous_role() {
        let db = open_in_memory().await.unwrap();
        let manager = AdminRoleManager::new(db.clone(), vec![]);
        let now = Utc::now();

        let mut conn = db.acquire().await.unwrap();
        AdminRoleManager::set_role_in(&mut conn, "alice", Role::Admin, "root", now)
            .await
            .unwrap();
        AdminRoleManager::set_role_in(&mut conn, "alice", Role::Moderator, "root", now)
            .await
            .unwrap();
        drop(conn);

        let assignments = manager.list_assignments().await.unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].role, Role::Moderator);
        assert!(manager.authorize(Some("alice"), Role::Moderator).await.unwrap());
        assert!(!manager.authorize(Some("alice"), Role::Admin).await.unwrap());
    }

    #[tokio::test]
    async fn test_stored_role_overrides_bootstrap() {
        let db = open_in_memory().await.unwrap();
        let manager = AdminRoleManager::new(db.clone(), vec!["root".to_string()]);

        let mut conn = db.acquire().await.unwrap();
        AdminRoleManager::set_role_in(&mut conn, "root", Role::Moderator, "other", Utc::now())
            .await
            .unwrap();
        drop(conn);

        assert!(matches!(
            manager.require(Some("root"), Role::Admin).await,
            Err(DirectoryError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_assigning_user_clears_row() {
        let db = open_in_memory().await.unwrap();
        let manager = AdminRoleManager::new(db.clone(), vec![]);

        let mut conn = db.acquire().await.unwrap();
        AdminRoleManager::set_role_in(&mut conn, "bob", Role::Moderator, "root", Utc::now())
            .await
            .unwrap();
        AdminRoleManager::set_role_in(&mut conn, "bob", Role::User, "root", Utc::now())
            .await
            .unwrap();
        assert_eq!(
            AdminRoleManager::stored_role_in(&mut conn, "bob").await.unwrap(),
            Role::User
        );
        drop(conn);

        assert!(manager.get_assignment("bob").await.unwrap().is_none());
    }
}
