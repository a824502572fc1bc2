/// Admin API Endpoints
/// Moderation actions, bulk actions, audit log queries and the review queue
use crate::{
    admin::{
        ActionOutcome, ActionRequest, AuditFilter, AuditLogEntry, AuditPage, BulkActionRequest,
        BulkResult, ResourceType, Role, RoleAssignment,
    },
    auth::AuthContext,
    directory::QueueEntry,
    error::{DirectoryError, DirectoryResult},
    AppContext,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Build admin API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        // Moderation
        .route("/admin/actions", post(apply_action))
        .route("/admin/actions/bulk", post(apply_bulk_action))
        .route("/admin/queue", get(get_queue))
        // Audit log
        .route("/admin/audit-log", get(query_audit_log))
        .route("/admin/audit-log/:id", get(get_audit_entry))
        // Roles
        .route("/admin/roles", get(list_roles))
        .route("/admin/roles/me", get(get_my_role))
}

/// Apply a single moderation action
async fn apply_action(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ActionRequest>,
) -> DirectoryResult<Json<ActionOutcome>> {
    let outcome = ctx
        .moderation_manager
        .apply_action(Some(&auth.principal), &req)
        .await?;

    Ok(Json(outcome))
}

/// Apply one action to many resources and report per-item results
async fn apply_bulk_action(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<BulkActionRequest>,
) -> DirectoryResult<Json<BulkResult>> {
    let result = ctx
        .moderation_manager
        .apply_bulk_action(Some(&auth.principal), &req, None)
        .await?;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct AuditLogQuery {
    actor_id: Option<String>,
    action: Option<String>,
    resource_type: Option<String>,
    resource_id: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    /// Zero-based
    page: Option<u32>,
    page_size: Option<u32>,
}

/// Query the audit log, newest first
async fn query_audit_log(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<AuditLogQuery>,
) -> DirectoryResult<Json<AuditPage>> {
    ctx.admin_role_manager
        .require(Some(&auth.principal.id), Role::Moderator)
        .await?;

    let filter = AuditFilter {
        actor_id: params.actor_id,
        action: params.action,
        resource_type: params.resource_type,
        resource_id: params.resource_id,
        from: params.from,
        to: params.to,
    };

    let page = ctx
        .audit_log
        .query(&filter, params.page.unwrap_or(0), params.page_size)
        .await?;

    Ok(Json(page))
}

/// Fetch one audit entry
async fn get_audit_entry(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> DirectoryResult<Json<AuditLogEntry>> {
    ctx.admin_role_manager
        .require(Some(&auth.principal.id), Role::Moderator)
        .await?;

    let entry = ctx
        .audit_log
        .get(id)
        .await?
        .ok_or_else(|| DirectoryError::NotFound(format!("Audit entry {} not found", id)))?;

    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
struct QueueQuery {
    resource_type: ResourceType,
    status: Option<String>,
    limit: Option<u32>,
}

#[derive(Serialize)]
struct QueueResponse {
    items: Vec<QueueEntry>,
}

/// Resources awaiting moderation
async fn get_queue(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<QueueQuery>,
) -> DirectoryResult<Json<QueueResponse>> {
    ctx.admin_role_manager
        .require(Some(&auth.principal.id), Role::Moderator)
        .await?;

    let limit = params.limit.unwrap_or(50).min(200);
    let items = ctx
        .directory
        .list_queue(params.resource_type, params.status.as_deref(), limit)
        .await?;

    Ok(Json(QueueResponse { items }))
}

#[derive(Serialize)]
struct RolesResponse {
    roles: Vec<RoleAssignment>,
}

/// List elevated role assignments
async fn list_roles(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DirectoryResult<Json<RolesResponse>> {
    ctx.admin_role_manager
        .require(Some(&auth.principal.id), Role::Admin)
        .await?;

    let roles = ctx.admin_role_manager.list_assignments().await?;
    Ok(Json(RolesResponse { roles }))
}

#[derive(Serialize)]
struct MyRoleResponse {
    principal_id: String,
    role: Role,
}

/// Resolved role of the caller
async fn get_my_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DirectoryResult<Json<MyRoleResponse>> {
    let role = ctx
        .admin_role_manager
        .resolve_role(Some(&auth.principal.id))
        .await?;

    Ok(Json(MyRoleResponse {
        principal_id: auth.principal.id,
        role,
    }))
}
