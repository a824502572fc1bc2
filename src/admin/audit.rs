/// Append-only admin audit trail
use crate::config::AuditConfig;
use crate::db::{decode_timestamp, encode_timestamp};
use crate::error::{is_transient_sqlx, DirectoryError, DirectoryResult};
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

/// Admin action audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub actor_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Entry to be appended; id and timestamp are assigned on insert
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub actor_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Audit query filters. Actor and resource ids match by prefix, the rest
/// exactly; the date range is inclusive on both ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// One page of audit entries, newest first
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditLogEntry>,
    /// Zero-based page index
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub has_more: bool,
}

/// Audit log reader/writer
#[derive(Clone)]
pub struct AuditLog {
    db: SqlitePool,
    config: AuditConfig,
}

impl AuditLog {
    pub fn new(db: SqlitePool, config: AuditConfig) -> Self {
        Self { db, config }
    }

    /// Append an entry on the caller's connection, normally the transaction
    /// that performed the audited mutation. Non-transient failures surface as
    /// `AuditWriteFailed` so the caller rolls back.
    pub async fn append(conn: &mut SqliteConnection, record: &AuditRecord) -> DirectoryResult<i64> {
        let now = encode_timestamp(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO admin_audit_log
            (actor_id, action, resource_type, resource_id, old_values, new_values, ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.actor_id)
        .bind(&record.action)
        .bind(&record.resource_type)
        .bind(&record.resource_id)
        .bind(record.old_values.as_ref().map(|v| v.to_string()))
        .bind(record.new_values.as_ref().map(|v| v.to_string()))
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(now)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(e) if is_transient_sqlx(&e) => Err(e.into()),
            Err(e) => {
                metrics::record_audit_write(false);
                tracing::error!(
                    actor_id = %record.actor_id,
                    action = %record.action,
                    error = %e,
                    "Failed to append audit entry"
                );
                Err(DirectoryError::AuditWriteFailed(e.to_string()))
            }
        }
    }

    /// Fetch a single entry
    pub async fn get(&self, id: i64) -> DirectoryResult<Option<AuditLogEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, actor_id, action, resource_type, resource_id, old_values, new_values,
                   ip_address, user_agent, created_at
            FROM admin_audit_log
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| parse_entry(&row)).transpose()
    }

    /// Query entries newest first. Pages are independent: fetching page `n`
    /// needs no state from page `n - 1`.
    pub async fn query(
        &self,
        filter: &AuditFilter,
        page: u32,
        page_size: Option<u32>,
    ) -> DirectoryResult<AuditPage> {
        let page_size = page_size
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size);
        let offset = i64::from(page) * i64::from(page_size);

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM admin_audit_log");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT id, actor_id, action, resource_type, resource_id, old_values, new_values, \
             ip_address, user_agent, created_at FROM admin_audit_log",
        );
        push_filters(&mut select, filter);
        select.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        select.push_bind(i64::from(page_size));
        select.push(" OFFSET ");
        select.push_bind(offset);

        let rows = select.build().fetch_all(&self.db).await?;
        let entries = rows.iter().map(parse_entry).collect::<DirectoryResult<Vec<_>>>()?;

        tracing::debug!(
            page,
            page_size,
            total,
            returned = entries.len(),
            "Audit log query"
        );

        Ok(AuditPage {
            has_more: offset + (entries.len() as i64) < total,
            entries,
            page,
            page_size,
            total,
        })
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &AuditFilter) {
    builder.push(" WHERE 1 = 1");

    if let Some(actor_id) = filter.actor_id.as_deref().filter(|s| !s.is_empty()) {
        push_prefix(builder, "actor_id", actor_id);
    }
    if let Some(action) = filter.action.as_deref().filter(|s| !s.is_empty()) {
        builder.push(" AND action = ");
        builder.push_bind(action.to_string());
    }
    if let Some(resource_type) = filter.resource_type.as_deref().filter(|s| !s.is_empty()) {
        builder.push(" AND resource_type = ");
        builder.push_bind(resource_type.to_string());
    }
    if let Some(resource_id) = filter.resource_id.as_deref().filter(|s| !s.is_empty()) {
        push_prefix(builder, "resource_id", resource_id);
    }
    if let Some(from) = filter.from {
        builder.push(" AND created_at >= ");
        builder.push_bind(encode_timestamp(from));
    }
    if let Some(to) = filter.to {
        builder.push(" AND created_at <= ");
        builder.push_bind(encode_timestamp(to));
    }
}

/// Case-sensitive prefix match. `LIKE` folds ASCII case, and principal ids
/// must not.
fn push_prefix(builder: &mut QueryBuilder<'_, Sqlite>, column: &'static str, prefix: &str) {
    builder.push(format_args!(" AND substr({}, 1, length(", column));
    builder.push_bind(prefix.to_string());
    builder.push(")) = ");
    builder.push_bind(prefix.to_string());
}

fn parse_json(raw: Option<String>) -> DirectoryResult<Option<serde_json::Value>> {
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| DirectoryError::Internal(format!("Corrupt audit snapshot: {}", e)))
    })
    .transpose()
}

fn parse_entry(row: &sqlx::sqlite::SqliteRow) -> DirectoryResult<AuditLogEntry> {
    let created_at: String = row.try_get("created_at")?;

    Ok(AuditLogEntry {
        id: row.try_get("id")?,
        actor_id: row.try_get("actor_id")?,
        action: row.try_get("action")?,
        resource_type: row.try_get("resource_type")?,
        resource_id: row.try_get("resource_id")?,
        old_values: parse_json(row.try_get("old_values")?)?,
        new_values: parse_json(row.try_get("new_values")?)?,
        created_at: decode_timestamp(&created_at)?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
    })
}
