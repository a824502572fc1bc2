/// Directory records subject to moderation: user profiles, agent listings
/// and reviews, plus the moderation queue over them
use crate::admin::resources::{
    AccountStatus, AgentStatus, ResourceStatus, ResourceType, ReviewStatus,
};
use crate::db::{decode_timestamp, encode_timestamp};
use crate::error::{DirectoryError, DirectoryResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use validator::Validate;

/// User profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub status: AccountStatus,
    pub moderation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing submission
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewAgentListing {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 60))]
    pub category: Option<String>,
    #[validate(url)]
    pub website_url: Option<String>,
    pub submitted_by: Option<String>,
}

/// AI agent listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentListing {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub website_url: Option<String>,
    pub submitted_by: Option<String>,
    pub status: AgentStatus,
    pub moderation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review submission
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewReview {
    pub agent_id: String,
    pub user_id: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: i64,
    #[validate(length(max = 5000))]
    pub content: Option<String>,
}

/// Review of an agent listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub agent_id: String,
    pub user_id: String,
    pub rating: i64,
    pub content: Option<String>,
    pub status: ReviewStatus,
    pub moderation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row in the moderation queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub resource_type: ResourceType,
    pub id: String,
    /// Listing name, review's agent id or username
    pub label: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Reads and writes directory records
#[derive(Clone)]
pub struct DirectoryStore {
    db: SqlitePool,
}

impl DirectoryStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create an active profile
    pub async fn register_profile(&self, username: &str, email: Option<&str>) -> DirectoryResult<Profile> {
        if username.trim().is_empty() {
            return Err(DirectoryError::Validation("username must not be empty".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO profiles (id, username, email, status, created_at, updated_at)
            VALUES (?, ?, ?, 'active', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(username)
        .bind(email)
        .bind(encode_timestamp(now))
        .bind(encode_timestamp(now))
        .execute(&self.db)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &result {
            if db_err.is_unique_violation() {
                return Err(DirectoryError::Validation(format!(
                    "Username {} is already taken",
                    username
                )));
            }
        }
        result?;

        Ok(Profile {
            id,
            username: username.to_string(),
            email: email.map(str::to_string),
            status: AccountStatus::Active,
            moderation_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Submit a listing; it starts out pending review
    pub async fn submit_agent(&self, listing: &NewAgentListing) -> DirectoryResult<AgentListing> {
        listing.validate()?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO ai_agents
            (id, name, description, category, website_url, submitted_by, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&listing.name)
        .bind(&listing.description)
        .bind(&listing.category)
        .bind(&listing.website_url)
        .bind(&listing.submitted_by)
        .bind(encode_timestamp(now))
        .bind(encode_timestamp(now))
        .execute(&self.db)
        .await?;

        tracing::debug!(agent_id = %id, name = %listing.name, "Agent listing submitted");

        Ok(AgentListing {
            id,
            name: listing.name.clone(),
            description: listing.description.clone(),
            category: listing.category.clone(),
            website_url: listing.website_url.clone(),
            submitted_by: listing.submitted_by.clone(),
            status: AgentStatus::Pending,
            moderation_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Submit a review of an existing listing
    pub async fn submit_review(&self, review: &NewReview) -> DirectoryResult<Review> {
        review.validate()?;

        if self.get_agent(&review.agent_id).await?.is_none() {
            return Err(DirectoryError::NotFound(format!(
                "ai_agents {} not found",
                review.agent_id
            )));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO reviews
            (id, agent_id, user_id, rating, content, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&review.agent_id)
        .bind(&review.user_id)
        .bind(review.rating)
        .bind(&review.content)
        .bind(encode_timestamp(now))
        .bind(encode_timestamp(now))
        .execute(&self.db)
        .await?;

        Ok(Review {
            id,
            agent_id: review.agent_id.clone(),
            user_id: review.user_id.clone(),
            rating: review.rating,
            content: review.content.clone(),
            status: ReviewStatus::Pending,
            moderation_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_profile(&self, id: &str) -> DirectoryResult<Option<Profile>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, email, status, moderation_reason, created_at, updated_at
            FROM profiles
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| parse_profile(&row)).transpose()
    }

    pub async fn get_agent(&self, id: &str) -> DirectoryResult<Option<AgentListing>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, category, website_url, submitted_by,
                   status, moderation_reason, created_at, updated_at
            FROM ai_agents
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| parse_agent(&row)).transpose()
    }

    pub async fn get_review(&self, id: &str) -> DirectoryResult<Option<Review>> {
        let row = sqlx::query(
            r#"
            SELECT id, agent_id, user_id, rating, content, status, moderation_reason,
                   created_at, updated_at
            FROM reviews
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| parse_review(&row)).transpose()
    }

    /// Resources awaiting moderation, oldest first.
    ///
    /// Defaults to `pending` for listings and reviews and `flagged` for
    /// accounts, which have no pending state.
    pub async fn list_queue(
        &self,
        resource_type: ResourceType,
        status: Option<&str>,
        limit: u32,
    ) -> DirectoryResult<Vec<QueueEntry>> {
        let status = match status {
            Some(s) => ResourceStatus::parse(resource_type, s)?,
            None => match resource_type {
                ResourceType::AgentListing => ResourceStatus::Agent(AgentStatus::Pending),
                ResourceType::Review => ResourceStatus::Review(ReviewStatus::Pending),
                ResourceType::UserAccount => ResourceStatus::Account(AccountStatus::Flagged),
            },
        };

        let label_column = match resource_type {
            ResourceType::AgentListing => "name",
            ResourceType::Review => "agent_id",
            ResourceType::UserAccount => "username",
        };
        let sql = format!(
            "SELECT id, {} AS label, status, created_at FROM {} WHERE status = ? ORDER BY created_at ASC, id ASC LIMIT ?",
            label_column,
            resource_type.table()
        );

        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(limit.max(1) as i64)
            .fetch_all(&self.db)
            .await?;

        rows.iter()
            .map(|row| -> DirectoryResult<QueueEntry> {
                let created_at: String = row.try_get("created_at")?;
                Ok(QueueEntry {
                    resource_type,
                    id: row.try_get("id")?,
                    label: row.try_get("label")?,
                    status: row.try_get("status")?,
                    created_at: decode_timestamp(&created_at)?,
                })
            })
            .collect()
    }
}

fn parse_profile(row: &sqlx::sqlite::SqliteRow) -> DirectoryResult<Profile> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let status = match ResourceStatus::parse(ResourceType::UserAccount, &status)? {
        ResourceStatus::Account(s) => s,
        other => return Err(unexpected_status(other)),
    };

    Ok(Profile {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        status,
        moderation_reason: row.try_get("moderation_reason")?,
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
    })
}

fn parse_agent(row: &sqlx::sqlite::SqliteRow) -> DirectoryResult<AgentListing> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let status = match ResourceStatus::parse(ResourceType::AgentListing, &status)? {
        ResourceStatus::Agent(s) => s,
        other => return Err(unexpected_status(other)),
    };

    Ok(AgentListing {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        website_url: row.try_get("website_url")?,
        submitted_by: row.try_get("submitted_by")?,
        status,
        moderation_reason: row.try_get("moderation_reason")?,
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
    })
}

fn parse_review(row: &sqlx::sqlite::SqliteRow) -> DirectoryResult<Review> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let status = match ResourceStatus::parse(ResourceType::Review, &status)? {
        ResourceStatus::Review(s) => s,
        other => return Err(unexpected_status(other)),
    };

    Ok(Review {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        user_id: row.try_get("user_id")?,
        rating: row.try_get("rating")?,
        content: row.try_get("content")?,
        status,
        moderation_reason: row.try_get("moderation_reason")?,
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
    })
}

fn unexpected_status(status: ResourceStatus) -> DirectoryError {
    DirectoryError::Internal(format!("Unexpected status kind: {:?}", status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn listing(name: &str) -> NewAgentListing {
        NewAgentListing {
            name: name.to_string(),
            description: Some("Answers questions".to_string()),
            category: Some("assistant".to_string()),
            website_url: Some("https://example.com".to_string()),
            submitted_by: None,
        }
    }

    #[tokio::test]
    async fn test_submit_agent_starts_pending() {
        let store = DirectoryStore::new(open_in_memory().await.unwrap());

        let agent = store.submit_agent(&listing("Helper")).await.unwrap();
        let stored = store.get_agent(&agent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AgentStatus::Pending);
        assert_eq!(stored.name, "Helper");
    }

    #[tokio::test]
    async fn test_submit_agent_rejects_bad_url() {
        let store = DirectoryStore::new(open_in_memory().await.unwrap());

        let mut bad = listing("Helper");
        bad.website_url = Some("not a url".to_string());
        assert!(matches!(
            store.submit_agent(&bad).await,
            Err(DirectoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_review_requires_existing_agent_and_valid_rating() {
        let store = DirectoryStore::new(open_in_memory().await.unwrap());
        let agent = store.submit_agent(&listing("Helper")).await.unwrap();

        let mut review = NewReview {
            agent_id: "missing".to_string(),
            user_id: "u1".to_string(),
            rating: 4,
            content: None,
        };
        assert!(matches!(
            store.submit_review(&review).await,
            Err(DirectoryError::NotFound(_))
        ));

        review.agent_id = agent.id.clone();
        review.rating = 6;
        assert!(matches!(
            store.submit_review(&review).await,
            Err(DirectoryError::Validation(_))
        ));

        review.rating = 5;
        let created = store.submit_review(&review).await.unwrap();
        assert_eq!(store.get_review(&created.id).await.unwrap().unwrap().rating, 5);
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let store = DirectoryStore::new(open_in_memory().await.unwrap());

        store.register_profile("alice", None).await.unwrap();
        assert!(matches!(
            store.register_profile("alice", Some("a@example.com")).await,
            Err(DirectoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_queue_defaults_and_ordering() {
        let store = DirectoryStore::new(open_in_memory().await.unwrap());

        let first = store.submit_agent(&listing("First")).await.unwrap();
        let second = store.submit_agent(&listing("Second")).await.unwrap();

        let queue = store
            .list_queue(ResourceType::AgentListing, None, 10)
            .await
            .unwrap();
        let ids: Vec<&str> = queue.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
        assert_eq!(queue[0].label, "First");

        let accounts = store
            .list_queue(ResourceType::UserAccount, None, 10)
            .await
            .unwrap();
        assert!(accounts.is_empty());

        assert!(store
            .list_queue(ResourceType::Review, Some("featured"), 10)
            .await
            .is_err());
    }
}
