/// Moderation actions over agent listings, reviews and user accounts
///
/// Every successful action commits its mutation and its audit entry in one
/// transaction. If either write fails, neither is visible.
use super::audit::{AuditLog, AuditRecord};
use super::notifications::{NotificationManager, NotificationParams};
use super::resources::{plan_transition, Effect, ModerationAction, ResourceStatus, ResourceType};
use super::roles::{AdminRoleManager, Role};
use super::Principal;
use crate::config::ModerationConfig;
use crate::db::{encode_timestamp, with_store_retry, RetryPolicy};
use crate::error::{DirectoryError, DirectoryResult};
use crate::metrics;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

/// Action-specific parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ActionParams {
    /// Free-text justification, recorded with status changes
    #[validate(length(min = 1, max = 1000))]
    pub reason: Option<String>,
    /// Target role for `assign_role`
    pub role: Option<Role>,
    /// Content for `send_notification`
    #[validate(nested)]
    pub notification: Option<NotificationParams>,
}

/// A single moderation action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: ModerationAction,
    pub resource_type: ResourceType,
    pub resource_id: String,
    #[serde(default)]
    pub params: ActionParams,
}

/// One action applied to many resources of the same type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkActionRequest {
    pub action: ModerationAction,
    pub resource_type: ResourceType,
    pub resource_ids: Vec<String>,
    #[serde(default)]
    pub params: ActionParams,
}

/// Result of a committed action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: ModerationAction,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub previous_status: String,
    /// Status after the action, `None` once the resource is deleted
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub audit_entry_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkItemStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Per-id result of a bulk action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub resource_id: String,
    pub status: BulkItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ActionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BulkItemResult {
    fn succeeded(outcome: ActionOutcome) -> Self {
        Self {
            resource_id: outcome.resource_id.clone(),
            status: BulkItemStatus::Succeeded,
            outcome: Some(outcome),
            error_code: None,
            message: None,
        }
    }

    fn failed(resource_id: &str, error: &DirectoryError) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            status: BulkItemStatus::Failed,
            outcome: None,
            error_code: Some(error.code().to_string()),
            message: Some(error.public_message()),
        }
    }

    fn cancelled(resource_id: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            status: BulkItemStatus::Cancelled,
            outcome: None,
            error_code: None,
            message: None,
        }
    }
}

/// Aggregate result of a bulk action. `items` follows request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResult {
    pub action: ModerationAction,
    pub resource_type: ResourceType,
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub items: Vec<BulkItemResult>,
}

/// Cooperative cancellation for a running bulk action. Items already in
/// flight finish; items not yet started are reported as cancelled.
#[derive(Debug, Clone, Default)]
pub struct BulkCancellation(Arc<AtomicBool>);

impl BulkCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Applies moderation actions
#[derive(Clone)]
pub struct ModerationManager {
    db: SqlitePool,
    roles: AdminRoleManager,
    config: ModerationConfig,
    retry: RetryPolicy,
}

impl ModerationManager {
    pub fn new(
        db: SqlitePool,
        roles: AdminRoleManager,
        config: ModerationConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            roles,
            config,
            retry,
        }
    }

    /// Apply one action on behalf of `principal`.
    ///
    /// The principal's role is resolved fresh for every call. On success the
    /// resource change and exactly one audit entry are committed together.
    pub async fn apply_action(
        &self,
        principal: Option<&Principal>,
        request: &ActionRequest,
    ) -> DirectoryResult<ActionOutcome> {
        let result = self.authorize_and_apply(principal, request).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.code(),
        };
        metrics::record_moderation_action(
            request.action.as_str(),
            request.resource_type.as_str(),
            outcome,
        );

        result
    }

    async fn authorize_and_apply(
        &self,
        principal: Option<&Principal>,
        request: &ActionRequest,
    ) -> DirectoryResult<ActionOutcome> {
        self.roles
            .require(principal.map(|p| p.id.as_str()), request.action.required_role())
            .await?;
        let principal = principal
            .ok_or_else(|| DirectoryError::NotAuthenticated("No authenticated principal".to_string()))?;

        self.validate_params(request)?;

        let outcome = with_store_retry(&self.retry, request.action.as_str(), || {
            self.execute(principal, request)
        })
        .await?;

        info!(
            actor_id = %principal.id,
            action = %request.action,
            resource_type = %request.resource_type,
            resource_id = %request.resource_id,
            audit_entry_id = outcome.audit_entry_id,
            "Moderation action applied"
        );

        Ok(outcome)
    }

    fn validate_params(&self, request: &ActionRequest) -> DirectoryResult<()> {
        if request.resource_id.trim().is_empty() {
            return Err(DirectoryError::Validation("resource_id must not be empty".to_string()));
        }

        request.params.validate()?;

        match request.action {
            ModerationAction::Reject if self.config.require_rejection_reason => {
                let has_reason = request
                    .params
                    .reason
                    .as_deref()
                    .is_some_and(|r| !r.trim().is_empty());
                if !has_reason {
                    return Err(DirectoryError::Validation(
                        "A reason is required to reject".to_string(),
                    ));
                }
            }
            ModerationAction::AssignRole => match request.params.role {
                None => {
                    return Err(DirectoryError::Validation(
                        "assign_role requires a role".to_string(),
                    ))
                }
                Some(Role::User) => {
                    return Err(DirectoryError::Validation(
                        "Use remove_role to return an account to user".to_string(),
                    ))
                }
                Some(_) => {}
            },
            ModerationAction::SendNotification if request.params.notification.is_none() => {
                return Err(DirectoryError::Validation(
                    "send_notification requires a notification".to_string(),
                ));
            }
            _ => {}
        }

        Ok(())
    }

    /// One attempt: read, plan, mutate, audit, commit. Any early return drops
    /// the transaction, which rolls it back.
    async fn execute(
        &self,
        principal: &Principal,
        request: &ActionRequest,
    ) -> DirectoryResult<ActionOutcome> {
        let resource_type = request.resource_type;
        let resource_id = request.resource_id.as_str();

        let mut tx = self.db.begin().await?;

        self.roles
            .require_in(&mut tx, &principal.id, request.action.required_role())
            .await?;

        let current = fetch_status(&mut tx, resource_type, resource_id)
            .await?
            .ok_or_else(|| {
                DirectoryError::NotFound(format!("{} {} not found", resource_type, resource_id))
            })?;
        let effect = plan_transition(resource_type, current, request.action)?;
        let now = Utc::now();

        let mut status = Some(current.as_str().to_string());
        let mut role = None;

        let (old_values, new_values) = match effect {
            Effect::SetStatus(next) => {
                let reason = request.params.reason.as_deref();
                update_status(&mut tx, resource_type, resource_id, next, reason, now).await?;
                status = Some(next.as_str().to_string());

                let mut new_values = json!({ "status": next.as_str() });
                if let Some(reason) = reason {
                    new_values["reason"] = json!(reason);
                }
                (Some(json!({ "status": current.as_str() })), Some(new_values))
            }
            Effect::AssignRole | Effect::ClearRole => {
                let target = match effect {
                    Effect::AssignRole => request.params.role.ok_or_else(|| {
                        DirectoryError::Validation("assign_role requires a role".to_string())
                    })?,
                    _ => Role::User,
                };
                let previous = AdminRoleManager::stored_role_in(&mut tx, resource_id).await?;
                AdminRoleManager::set_role_in(&mut tx, resource_id, target, &principal.id, now)
                    .await?;
                role = Some(target);

                (
                    Some(json!({ "role": previous.as_str() })),
                    Some(json!({ "role": target.as_str() })),
                )
            }
            Effect::Notify => {
                let params = request.params.notification.as_ref().ok_or_else(|| {
                    DirectoryError::Validation("send_notification requires a notification".to_string())
                })?;
                let notification_id =
                    NotificationManager::deliver_in(&mut tx, resource_id, params, &principal.id, now)
                        .await?;

                (
                    None,
                    Some(json!({
                        "notification_id": notification_id,
                        "title": params.title,
                        "message": params.message,
                        "severity": params.severity.as_str(),
                    })),
                )
            }
            Effect::Remove => {
                let snapshot = fetch_snapshot(&mut tx, resource_type, resource_id).await?;
                delete_resource(&mut tx, resource_type, resource_id).await?;
                status = None;

                (Some(snapshot), None)
            }
        };

        let audit_entry_id = AuditLog::append(
            &mut tx,
            &AuditRecord {
                actor_id: principal.id.clone(),
                action: request.action.as_str().to_string(),
                resource_type: resource_type.as_str().to_string(),
                resource_id: Some(resource_id.to_string()),
                old_values,
                new_values,
                ip_address: principal.ip_address.clone(),
                user_agent: principal.user_agent.clone(),
            },
        )
        .await?;

        if let Err(e) = tx.commit().await {
            metrics::record_audit_write(false);
            return Err(e.into());
        }
        metrics::record_audit_write(true);

        Ok(ActionOutcome {
            action: request.action,
            resource_type,
            resource_id: resource_id.to_string(),
            previous_status: current.as_str().to_string(),
            status,
            role,
            audit_entry_id,
        })
    }

    /// Apply one action to many resources.
    ///
    /// Authorization is checked once up front and again for every item, so a
    /// role revoked mid-run stops the remaining items. Each id is its own
    /// transaction: failures are reported per item and never undo items that
    /// already succeeded. Duplicate ids are processed once.
    pub async fn apply_bulk_action(
        &self,
        principal: Option<&Principal>,
        request: &BulkActionRequest,
        cancellation: Option<&BulkCancellation>,
    ) -> DirectoryResult<BulkResult> {
        self.roles
            .require(principal.map(|p| p.id.as_str()), request.action.required_role())
            .await?;

        if request.resource_ids.is_empty() {
            return Err(DirectoryError::Validation("resource_ids must not be empty".to_string()));
        }
        if request.resource_ids.len() > self.config.max_bulk_items {
            return Err(DirectoryError::Validation(format!(
                "Bulk actions are limited to {} items",
                self.config.max_bulk_items
            )));
        }

        let mut seen = HashSet::new();
        let ids: Vec<String> = request
            .resource_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        info!(
            action = %request.action,
            resource_type = %request.resource_type,
            count = ids.len(),
            "Starting bulk moderation action"
        );

        let items: Vec<BulkItemResult> = stream::iter(ids)
            .map(|id: String| async move {
                if cancellation.is_some_and(BulkCancellation::is_cancelled) {
                    return BulkItemResult::cancelled(&id);
                }

                let single = ActionRequest {
                    action: request.action,
                    resource_type: request.resource_type,
                    resource_id: id,
                    params: request.params.clone(),
                };

                match self.apply_action(principal, &single).await {
                    Ok(outcome) => BulkItemResult::succeeded(outcome),
                    Err(e) => {
                        warn!(resource_id = %single.resource_id, error = %e, "Bulk item failed");
                        BulkItemResult::failed(&single.resource_id, &e)
                    }
                }
            })
            .buffered(self.config.bulk_concurrency.max(1))
            .collect()
            .await;

        let mut result = BulkResult {
            action: request.action,
            resource_type: request.resource_type,
            requested: items.len(),
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            items: Vec::new(),
        };
        for item in &items {
            let label = match item.status {
                BulkItemStatus::Succeeded => {
                    result.succeeded += 1;
                    "succeeded"
                }
                BulkItemStatus::Failed => {
                    result.failed += 1;
                    "failed"
                }
                BulkItemStatus::Cancelled => {
                    result.cancelled += 1;
                    "cancelled"
                }
            };
            metrics::record_bulk_item(request.action.as_str(), label);
        }
        result.items = items;

        info!(
            action = %request.action,
            succeeded = result.succeeded,
            failed = result.failed,
            cancelled = result.cancelled,
            "Bulk moderation action finished"
        );

        Ok(result)
    }
}

async fn fetch_status(
    conn: &mut SqliteConnection,
    resource_type: ResourceType,
    resource_id: &str,
) -> DirectoryResult<Option<ResourceStatus>> {
    let sql = format!("SELECT status FROM {} WHERE id = ?", resource_type.table());
    let status: Option<String> = sqlx::query_scalar(&sql)
        .bind(resource_id)
        .fetch_optional(&mut *conn)
        .await?;

    status
        .map(|s| ResourceStatus::parse(resource_type, &s))
        .transpose()
}

async fn update_status(
    conn: &mut SqliteConnection,
    resource_type: ResourceType,
    resource_id: &str,
    status: ResourceStatus,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> DirectoryResult<()> {
    let sql = format!(
        "UPDATE {} SET status = ?, moderation_reason = ?, updated_at = ? WHERE id = ?",
        resource_type.table()
    );
    let result = sqlx::query(&sql)
        .bind(status.as_str())
        .bind(reason)
        .bind(encode_timestamp(now))
        .bind(resource_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DirectoryError::NotFound(format!(
            "{} {} not found",
            resource_type, resource_id
        )));
    }

    Ok(())
}

/// Capture the row about to be deleted, for the audit entry's old values
async fn fetch_snapshot(
    conn: &mut SqliteConnection,
    resource_type: ResourceType,
    resource_id: &str,
) -> DirectoryResult<serde_json::Value> {
    match resource_type {
        ResourceType::AgentListing => {
            let row = sqlx::query(
                r#"
                SELECT id, name, category, website_url, submitted_by, status, moderation_reason
                FROM ai_agents
                WHERE id = ?
                "#,
            )
            .bind(resource_id)
            .fetch_one(&mut *conn)
            .await?;

            Ok(json!({
                "id": row.try_get::<String, _>("id")?,
                "name": row.try_get::<String, _>("name")?,
                "category": row.try_get::<Option<String>, _>("category")?,
                "website_url": row.try_get::<Option<String>, _>("website_url")?,
                "submitted_by": row.try_get::<Option<String>, _>("submitted_by")?,
                "status": row.try_get::<String, _>("status")?,
                "moderation_reason": row.try_get::<Option<String>, _>("moderation_reason")?,
            }))
        }
        ResourceType::Review => {
            let row = sqlx::query(
                r#"
                SELECT id, agent_id, user_id, rating, content, status, moderation_reason
                FROM reviews
                WHERE id = ?
                "#,
            )
            .bind(resource_id)
            .fetch_one(&mut *conn)
            .await?;

            Ok(json!({
                "id": row.try_get::<String, _>("id")?,
                "agent_id": row.try_get::<String, _>("agent_id")?,
                "user_id": row.try_get::<String, _>("user_id")?,
                "rating": row.try_get::<i64, _>("rating")?,
                "content": row.try_get::<Option<String>, _>("content")?,
                "status": row.try_get::<String, _>("status")?,
                "moderation_reason": row.try_get::<Option<String>, _>("moderation_reason")?,
            }))
        }
        ResourceType::UserAccount => Err(DirectoryError::InvalidTransition(
            "User accounts cannot be deleted".to_string(),
        )),
    }
}

async fn delete_resource(
    conn: &mut SqliteConnection,
    resource_type: ResourceType,
    resource_id: &str,
) -> DirectoryResult<()> {
    let sql = format!("DELETE FROM {} WHERE id = ?", resource_type.table());
    sqlx::query(&sql)
        .bind(resource_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::audit::AuditFilter;
    use crate::admin::notifications::Severity;
    use crate::admin::resources::AgentStatus;
    use crate::test_support::{fixture, Fixture};

    fn reject(id: &str, reason: Option<&str>) -> ActionRequest {
        ActionRequest {
            action: ModerationAction::Reject,
            resource_type: ResourceType::AgentListing,
            resource_id: id.to_string(),
            params: ActionParams {
                reason: reason.map(str::to_string),
                ..Default::default()
            },
        }
    }

    fn simple(action: ModerationAction, resource_type: ResourceType, id: &str) -> ActionRequest {
        ActionRequest {
            action,
            resource_type,
            resource_id: id.to_string(),
            params: ActionParams::default(),
        }
    }

    async fn audit_count(fx: &Fixture) -> i64 {
        fx.audit.query(&AuditFilter::default(), 0, None).await.unwrap().total
    }

    #[tokio::test]
    async fn test_reject_records_reason_and_audit_entry() {
        let fx = fixture().await;
        let moderator = fx.principal_with_role("mod-1", Role::Moderator).await;
        let agent = fx.pending_agent("Summarizer").await;

        let outcome = fx
            .moderation
            .apply_action(Some(&moderator), &reject(&agent, Some("duplicate")))
            .await
            .unwrap();
        assert_eq!(outcome.status.as_deref(), Some("rejected"));
        assert_eq!(outcome.previous_status, "pending");

        let listing = fx.directory.get_agent(&agent).await.unwrap().unwrap();
        assert_eq!(listing.moderation_reason.as_deref(), Some("duplicate"));

        let entry = fx.audit.get(outcome.audit_entry_id).await.unwrap().unwrap();
        assert_eq!(entry.actor_id, "mod-1");
        assert_eq!(entry.action, "reject");
        assert_eq!(entry.resource_type, "ai_agents");
        assert_eq!(entry.resource_id.as_deref(), Some(agent.as_str()));
        assert_eq!(entry.old_values, Some(json!({ "status": "pending" })));
        assert_eq!(
            entry.new_values,
            Some(json!({ "status": "rejected", "reason": "duplicate" }))
        );
    }

    #[tokio::test]
    async fn test_reject_without_reason_is_rejected() {
        let fx = fixture().await;
        let moderator = fx.principal_with_role("mod-1", Role::Moderator).await;
        let agent = fx.pending_agent("Summarizer").await;

        let result = fx
            .moderation
            .apply_action(Some(&moderator), &reject(&agent, None))
            .await;
        assert!(matches!(result, Err(DirectoryError::Validation(_))));
        assert_eq!(audit_count(&fx).await, 0);
    }

    #[tokio::test]
    async fn test_permission_denied_writes_nothing() {
        let fx = fixture().await;
        let user = Principal::new("plain-user");
        let agent = fx.pending_agent("Summarizer").await;

        let result = fx
            .moderation
            .apply_action(Some(&user), &simple(ModerationAction::Approve, ResourceType::AgentListing, &agent))
            .await;
        assert!(matches!(result, Err(DirectoryError::PermissionDenied(_))));

        let listing = fx.directory.get_agent(&agent).await.unwrap().unwrap();
        assert_eq!(listing.status.as_str(), "pending");
        assert_eq!(audit_count(&fx).await, 0);
    }

    #[tokio::test]
    async fn test_missing_principal_is_not_authenticated() {
        let fx = fixture().await;
        let agent = fx.pending_agent("Summarizer").await;

        let result = fx
            .moderation
            .apply_action(None, &simple(ModerationAction::Approve, ResourceType::AgentListing, &agent))
            .await;
        assert!(matches!(result, Err(DirectoryError::NotAuthenticated(_))));
    }

    #[tokio::test]
    async fn test_moderator_cannot_ban() {
        let fx = fixture().await;
        let moderator = fx.principal_with_role("mod-1", Role::Moderator).await;
        let account = fx.profile("mallory").await;

        let result = fx
            .moderation
            .apply_action(Some(&moderator), &simple(ModerationAction::Ban, ResourceType::UserAccount, &account))
            .await;
        assert!(matches!(result, Err(DirectoryError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_audit_failure_rolls_back_mutation() {
        let fx = fixture().await;
        let moderator = fx.principal_with_role("mod-1", Role::Moderator).await;
        let agent = fx.pending_agent("Summarizer").await;

        sqlx::query(
            r#"
            CREATE TRIGGER fail_audit BEFORE INSERT ON admin_audit_log
            BEGIN SELECT RAISE(ABORT, 'disk full'); END
            "#,
        )
        .execute(&fx.db)
        .await
        .unwrap();

        let result = fx
            .moderation
            .apply_action(Some(&moderator), &simple(ModerationAction::Approve, ResourceType::AgentListing, &agent))
            .await;
        assert!(matches!(result, Err(DirectoryError::AuditWriteFailed(_))));

        let listing = fx.directory.get_agent(&agent).await.unwrap().unwrap();
        assert_eq!(listing.status.as_str(), "pending");

        sqlx::query("DROP TRIGGER fail_audit").execute(&fx.db).await.unwrap();
        assert_eq!(audit_count(&fx).await, 0);
    }

    #[tokio::test]
    async fn test_idempotent_approve_is_logged_each_time() {
        let fx = fixture().await;
        let moderator = fx.principal_with_role("mod-1", Role::Moderator).await;
        let agent = fx.pending_agent("Summarizer").await;
        let approve = simple(ModerationAction::Approve, ResourceType::AgentListing, &agent);

        let first = fx.moderation.apply_action(Some(&moderator), &approve).await.unwrap();
        let second = fx.moderation.apply_action(Some(&moderator), &approve).await.unwrap();

        assert_ne!(first.audit_entry_id, second.audit_entry_id);
        assert_eq!(second.previous_status, "approved");
        assert_eq!(audit_count(&fx).await, 2);
    }

    #[tokio::test]
    async fn test_feature_pending_listing_is_invalid() {
        let fx = fixture().await;
        let moderator = fx.principal_with_role("mod-1", Role::Moderator).await;
        let agent = fx.pending_agent("Summarizer").await;

        let result = fx
            .moderation
            .apply_action(Some(&moderator), &simple(ModerationAction::Feature, ResourceType::AgentListing, &agent))
            .await;
        assert!(matches!(result, Err(DirectoryError::InvalidTransition(_))));
        assert_eq!(audit_count(&fx).await, 0);
    }

    #[tokio::test]
    async fn test_delete_is_terminal() {
        let fx = fixture().await;
        let admin = fx.principal_with_role("admin-1", Role::Admin).await;
        let agent = fx.pending_agent("Summarizer").await;
        let delete = simple(ModerationAction::Delete, ResourceType::AgentListing, &agent);

        let outcome = fx.moderation.apply_action(Some(&admin), &delete).await.unwrap();
        assert!(outcome.status.is_none());
        assert!(fx.directory.get_agent(&agent).await.unwrap().is_none());

        let entry = fx.audit.get(outcome.audit_entry_id).await.unwrap().unwrap();
        assert!(entry.new_values.is_none());
        assert_eq!(entry.old_values.unwrap()["name"], "Summarizer");

        let again = fx
            .moderation
            .apply_action(Some(&admin), &simple(ModerationAction::Approve, ResourceType::AgentListing, &agent))
            .await;
        assert!(matches!(again, Err(DirectoryError::NotFound(_))));
        assert_eq!(audit_count(&fx).await, 1);
    }

    #[tokio::test]
    async fn test_role_assignment_takes_effect_immediately() {
        let fx = fixture().await;
        let admin = fx.principal_with_role("admin-1", Role::Admin).await;
        let account = fx.profile("carol").await;
        let carol = Principal::new(account.as_str());
        let agent = fx.pending_agent("Summarizer").await;
        let approve = simple(ModerationAction::Approve, ResourceType::AgentListing, &agent);

        let mut assign = simple(ModerationAction::AssignRole, ResourceType::UserAccount, &account);
        assign.params.role = Some(Role::Moderator);
        let outcome = fx.moderation.apply_action(Some(&admin), &assign).await.unwrap();
        assert_eq!(outcome.role, Some(Role::Moderator));

        let entry = fx.audit.get(outcome.audit_entry_id).await.unwrap().unwrap();
        assert_eq!(entry.old_values, Some(json!({ "role": "user" })));
        assert_eq!(entry.new_values, Some(json!({ "role": "moderator" })));

        fx.moderation.apply_action(Some(&carol), &approve).await.unwrap();

        let remove = simple(ModerationAction::RemoveRole, ResourceType::UserAccount, &account);
        fx.moderation.apply_action(Some(&admin), &remove).await.unwrap();

        let result = fx.moderation.apply_action(Some(&carol), &approve).await;
        assert!(matches!(result, Err(DirectoryError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_send_notification_leaves_status_unchanged() {
        let fx = fixture().await;
        let admin = fx.principal_with_role("admin-1", Role::Admin).await;
        let account = fx.profile("dave").await;

        let mut notify = simple(ModerationAction::SendNotification, ResourceType::UserAccount, &account);
        notify.params.notification = Some(NotificationParams {
            title: "Heads up".to_string(),
            message: "Your listing needs a website".to_string(),
            severity: Severity::Warning,
        });
        let outcome = fx.moderation.apply_action(Some(&admin), &notify).await.unwrap();
        assert_eq!(outcome.status.as_deref(), Some("active"));

        let inbox = fx.notifications.list_for_user(&account).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].created_by, "admin-1");

        let entry = fx.audit.get(outcome.audit_entry_id).await.unwrap().unwrap();
        assert_eq!(entry.new_values.unwrap()["severity"], "warning");
    }

    #[tokio::test]
    async fn test_bulk_ban_reports_per_item_results() {
        let fx = fixture().await;
        let admin = fx.principal_with_role("admin-1", Role::Admin).await;
        let u1 = fx.profile("spam-1").await;
        let u3 = fx.profile("spam-3").await;

        let request = BulkActionRequest {
            action: ModerationAction::Ban,
            resource_type: ResourceType::UserAccount,
            resource_ids: vec![u1.clone(), "missing".to_string(), u3.clone()],
            params: ActionParams {
                reason: Some("spam ring".to_string()),
                ..Default::default()
            },
        };
        let result = fx
            .moderation
            .apply_bulk_action(Some(&admin), &request, None)
            .await
            .unwrap();

        assert_eq!(result.requested, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        let ids: Vec<&str> = result.items.iter().map(|i| i.resource_id.as_str()).collect();
        assert_eq!(ids, vec![u1.as_str(), "missing", u3.as_str()]);
        assert_eq!(result.items[1].error_code.as_deref(), Some("NotFound"));

        for id in [&u1, &u3] {
            let profile = fx.directory.get_profile(id).await.unwrap().unwrap();
            assert_eq!(profile.status.as_str(), "banned");
        }
        assert_eq!(audit_count(&fx).await, 2);
    }

    #[tokio::test]
    async fn test_bulk_deduplicates_ids() {
        let fx = fixture().await;
        let moderator = fx.principal_with_role("mod-1", Role::Moderator).await;
        let agent = fx.pending_agent("Summarizer").await;

        let request = BulkActionRequest {
            action: ModerationAction::Approve,
            resource_type: ResourceType::AgentListing,
            resource_ids: vec![agent.clone(), agent.clone()],
            params: ActionParams::default(),
        };
        let result = fx
            .moderation
            .apply_bulk_action(Some(&moderator), &request, None)
            .await
            .unwrap();

        assert_eq!(result.items.len(), 1);
        assert_eq!(audit_count(&fx).await, 1);
    }

    #[tokio::test]
    async fn test_bulk_denied_up_front() {
        let fx = fixture().await;
        let moderator = fx.principal_with_role("mod-1", Role::Moderator).await;
        let account = fx.profile("erin").await;

        let request = BulkActionRequest {
            action: ModerationAction::Ban,
            resource_type: ResourceType::UserAccount,
            resource_ids: vec![account],
            params: ActionParams::default(),
        };
        let result = fx
            .moderation
            .apply_bulk_action(Some(&moderator), &request, None)
            .await;
        assert!(matches!(result, Err(DirectoryError::PermissionDenied(_))));
        assert_eq!(audit_count(&fx).await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_bulk_skips_remaining_items() {
        let fx = fixture().await;
        let moderator = fx.principal_with_role("mod-1", Role::Moderator).await;
        let a = fx.pending_agent("A").await;
        let b = fx.pending_agent("B").await;

        let cancellation = BulkCancellation::new();
        cancellation.cancel();

        let request = BulkActionRequest {
            action: ModerationAction::Approve,
            resource_type: ResourceType::AgentListing,
            resource_ids: vec![a, b],
            params: ActionParams::default(),
        };
        let result = fx
            .moderation
            .apply_bulk_action(Some(&moderator), &request, Some(&cancellation))
            .await
            .unwrap();

        assert_eq!(result.cancelled, 2);
        assert!(result
            .items
            .iter()
            .all(|i| i.status == BulkItemStatus::Cancelled));
        assert_eq!(audit_count(&fx).await, 0);
    }

    #[tokio::test]
    async fn test_cancelling_mid_run_keeps_completed_items() {
        let fx = fixture().await;
        let moderator = fx.principal_with_role("mod-1", Role::Moderator).await;
        let moderation = ModerationManager::new(
            fx.db.clone(),
            AdminRoleManager::new(fx.db.clone(), vec![]),
            ModerationConfig {
                bulk_concurrency: 1,
                ..Default::default()
            },
            RetryPolicy::none(),
        );

        let mut ids = Vec::new();
        for i in 0..100 {
            ids.push(fx.pending_agent(&format!("Agent {}", i)).await);
        }
        let request = BulkActionRequest {
            action: ModerationAction::Approve,
            resource_type: ResourceType::AgentListing,
            resource_ids: ids,
            params: ActionParams::default(),
        };

        let cancellation = BulkCancellation::new();
        let run = moderation.apply_bulk_action(Some(&moderator), &request, Some(&cancellation));
        let cancel_after_first = async {
            while audit_count(&fx).await < 1 {
                tokio::task::yield_now().await;
            }
            cancellation.cancel();
        };
        let (result, ()) = tokio::join!(run, cancel_after_first);
        let result = result.unwrap();

        assert!(result.succeeded >= 1);
        assert!(result.cancelled >= 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.succeeded + result.cancelled, 100);

        let first_cancelled = result
            .items
            .iter()
            .position(|i| i.status == BulkItemStatus::Cancelled)
            .unwrap();
        assert_eq!(first_cancelled, result.succeeded);
        assert!(result.items[first_cancelled..]
            .iter()
            .all(|i| i.status == BulkItemStatus::Cancelled));
        assert_eq!(audit_count(&fx).await, result.succeeded as i64);

        let untouched = fx
            .directory
            .get_agent(&result.items[99].resource_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.status, AgentStatus::Pending);
    }

    #[tokio::test]
    async fn test_role_is_rechecked_inside_transaction() {
        let fx = fixture().await;
        let moderator = fx.principal_with_role("mod-1", Role::Moderator).await;
        let agent = fx.pending_agent("Helper").await;

        fx.principal_with_role("mod-1", Role::User).await;

        let result = fx
            .moderation
            .execute(
                &moderator,
                &simple(ModerationAction::Approve, ResourceType::AgentListing, &agent),
            )
            .await;
        assert!(matches!(result, Err(DirectoryError::PermissionDenied(_))));
        assert_eq!(audit_count(&fx).await, 0);

        let listing = fx.directory.get_agent(&agent).await.unwrap().unwrap();
        assert_eq!(listing.status, AgentStatus::Pending);
    }

    #[tokio::test]
    async fn test_bulk_limit_enforced() {
        let fx = fixture().await;
        let moderator = fx.principal_with_role("mod-1", Role::Moderator).await;

        let request = BulkActionRequest {
            action: ModerationAction::Approve,
            resource_type: ResourceType::AgentListing,
            resource_ids: (0..501).map(|i| format!("agent-{}", i)).collect(),
            params: ActionParams::default(),
        };
        let result = fx
            .moderation
            .apply_bulk_action(Some(&moderator), &request, None)
            .await;
        assert!(matches!(result, Err(DirectoryError::Validation(_))));
    }
}
