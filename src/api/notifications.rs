/// Notification inbox for the authenticated account
use crate::{admin::Notification, auth::AuthContext, error::DirectoryResult, AppContext};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", post(mark_read))
}

#[derive(Serialize)]
struct NotificationsResponse {
    notifications: Vec<Notification>,
}

async fn list_notifications(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DirectoryResult<Json<NotificationsResponse>> {
    let notifications = ctx
        .notification_manager
        .list_for_user(&auth.principal.id)
        .await?;

    Ok(Json(NotificationsResponse { notifications }))
}

async fn mark_read(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> DirectoryResult<StatusCode> {
    ctx.notification_manager
        .mark_read(id, &auth.principal.id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
