/// Notifications delivered to user accounts by admins
use crate::db::{decode_timestamp, encode_timestamp};
use crate::error::{DirectoryError, DirectoryResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Success,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Success => "success",
        }
    }

    pub fn from_str(s: &str) -> DirectoryResult<Self> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "success" => Ok(Severity::Success),
            _ => Err(DirectoryError::Validation(format!("Invalid severity: {}", s))),
        }
    }
}

/// Notification content carried by a `send_notification` action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NotificationParams {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
}

/// Delivered notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

/// Notification reader
#[derive(Clone)]
pub struct NotificationManager {
    db: SqlitePool,
}

impl NotificationManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a delivery record inside an open transaction
    pub(crate) async fn deliver_in(
        conn: &mut SqliteConnection,
        user_id: &str,
        params: &NotificationParams,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> DirectoryResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, title, message, severity, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&params.title)
        .bind(&params.message)
        .bind(params.severity.as_str())
        .bind(created_by)
        .bind(encode_timestamp(now))
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Notifications for a user, newest first
    pub async fn list_for_user(&self, user_id: &str) -> DirectoryResult<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, message, severity, created_by, created_at, read
            FROM notifications
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_notification).collect()
    }

    /// Mark one of the user's notifications as read
    pub async fn mark_read(&self, id: i64, user_id: &str) -> DirectoryResult<()> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DirectoryError::NotFound(format!("Notification {} not found", id)));
        }

        Ok(())
    }
}

fn parse_notification(row: &sqlx::sqlite::SqliteRow) -> DirectoryResult<Notification> {
    let severity: String = row.try_get("severity")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        severity: Severity::from_str(&severity)?,
        created_by: row.try_get("created_by")?,
        created_at: decode_timestamp(&created_at)?,
        read: row.try_get("read")?,
    })
}
