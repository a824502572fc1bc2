/// Moderable resources, their status sets and the legal transitions between them
use super::roles::Role;
use crate::error::{DirectoryError, DirectoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of resource subject to moderation. The serialized form is the
/// backing table name, which is also what the audit log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    #[serde(rename = "ai_agents", alias = "agent", alias = "agents")]
    AgentListing,
    #[serde(rename = "reviews", alias = "review")]
    Review,
    #[serde(rename = "profiles", alias = "user", alias = "users")]
    UserAccount,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        self.table()
    }

    pub fn table(&self) -> &'static str {
        match self {
            ResourceType::AgentListing => "ai_agents",
            ResourceType::Review => "reviews",
            ResourceType::UserAccount => "profiles",
        }
    }

    pub fn from_str(s: &str) -> DirectoryResult<Self> {
        match s.to_lowercase().as_str() {
            "ai_agents" | "agent" | "agents" => Ok(ResourceType::AgentListing),
            "reviews" | "review" => Ok(ResourceType::Review),
            "profiles" | "user" | "users" => Ok(ResourceType::UserAccount),
            _ => Err(DirectoryError::Validation(format!("Invalid resource type: {}", s))),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Approved,
    Rejected,
    Featured,
    Flagged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Flagged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Banned,
    Flagged,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Approved => "approved",
            AgentStatus::Rejected => "rejected",
            AgentStatus::Featured => "featured",
            AgentStatus::Flagged => "flagged",
        }
    }
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::Flagged => "flagged",
        }
    }
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Banned => "banned",
            AccountStatus::Flagged => "flagged",
        }
    }
}

/// Status of a resource, tagged by resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Agent(AgentStatus),
    Review(ReviewStatus),
    Account(AccountStatus),
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Agent(s) => s.as_str(),
            ResourceStatus::Review(s) => s.as_str(),
            ResourceStatus::Account(s) => s.as_str(),
        }
    }

    /// Parse a stored status for the given resource kind
    pub fn parse(resource_type: ResourceType, s: &str) -> DirectoryResult<Self> {
        let status = match (resource_type, s) {
            (ResourceType::AgentListing, "pending") => ResourceStatus::Agent(AgentStatus::Pending),
            (ResourceType::AgentListing, "approved") => ResourceStatus::Agent(AgentStatus::Approved),
            (ResourceType::AgentListing, "rejected") => ResourceStatus::Agent(AgentStatus::Rejected),
            (ResourceType::AgentListing, "featured") => ResourceStatus::Agent(AgentStatus::Featured),
            (ResourceType::AgentListing, "flagged") => ResourceStatus::Agent(AgentStatus::Flagged),
            (ResourceType::Review, "pending") => ResourceStatus::Review(ReviewStatus::Pending),
            (ResourceType::Review, "approved") => ResourceStatus::Review(ReviewStatus::Approved),
            (ResourceType::Review, "rejected") => ResourceStatus::Review(ReviewStatus::Rejected),
            (ResourceType::Review, "flagged") => ResourceStatus::Review(ReviewStatus::Flagged),
            (ResourceType::UserAccount, "active") => ResourceStatus::Account(AccountStatus::Active),
            (ResourceType::UserAccount, "suspended") => ResourceStatus::Account(AccountStatus::Suspended),
            (ResourceType::UserAccount, "banned") => ResourceStatus::Account(AccountStatus::Banned),
            (ResourceType::UserAccount, "flagged") => ResourceStatus::Account(AccountStatus::Flagged),
            _ => {
                return Err(DirectoryError::Validation(format!(
                    "Invalid status {:?} for {}",
                    s, resource_type
                )))
            }
        };
        Ok(status)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moderation action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Approve,
    Reject,
    Feature,
    Unfeature,
    Flag,
    Suspend,
    Ban,
    /// Restore a suspended, banned or flagged account
    Activate,
    AssignRole,
    RemoveRole,
    SendNotification,
    Delete,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::Approve => "approve",
            ModerationAction::Reject => "reject",
            ModerationAction::Feature => "feature",
            ModerationAction::Unfeature => "unfeature",
            ModerationAction::Flag => "flag",
            ModerationAction::Suspend => "suspend",
            ModerationAction::Ban => "ban",
            ModerationAction::Activate => "activate",
            ModerationAction::AssignRole => "assign_role",
            ModerationAction::RemoveRole => "remove_role",
            ModerationAction::SendNotification => "send_notification",
            ModerationAction::Delete => "delete",
        }
    }

    pub fn from_str(s: &str) -> DirectoryResult<Self> {
        match s.to_lowercase().as_str() {
            "approve" => Ok(ModerationAction::Approve),
            "reject" => Ok(ModerationAction::Reject),
            "feature" => Ok(ModerationAction::Feature),
            "unfeature" => Ok(ModerationAction::Unfeature),
            "flag" => Ok(ModerationAction::Flag),
            "suspend" => Ok(ModerationAction::Suspend),
            "ban" => Ok(ModerationAction::Ban),
            "activate" | "unban" | "restore" => Ok(ModerationAction::Activate),
            "assign_role" => Ok(ModerationAction::AssignRole),
            "remove_role" => Ok(ModerationAction::RemoveRole),
            "send_notification" => Ok(ModerationAction::SendNotification),
            "delete" => Ok(ModerationAction::Delete),
            _ => Err(DirectoryError::Validation(format!("Invalid moderation action: {}", s))),
        }
    }

    /// Minimum role needed to perform this action
    pub fn required_role(&self) -> Role {
        match self {
            ModerationAction::AssignRole
            | ModerationAction::RemoveRole
            | ModerationAction::Ban
            | ModerationAction::Delete
            | ModerationAction::SendNotification => Role::Admin,
            _ => Role::Moderator,
        }
    }
}

impl fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What applying an action does to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    SetStatus(ResourceStatus),
    /// Replace the account's role with the one carried in the action params
    AssignRole,
    /// Reset the account's role to `user`
    ClearRole,
    /// Deliver a notification, status unchanged
    Notify,
    /// Remove the resource permanently
    Remove,
}

/// Decide the effect of `action` on a resource of `resource_type` currently
/// in `current`. Transitions are not forward-only; idempotent repeats are
/// legal wherever the target status is reachable from itself.
pub fn plan_transition(
    resource_type: ResourceType,
    current: ResourceStatus,
    action: ModerationAction,
) -> DirectoryResult<Effect> {
    use ModerationAction as A;

    let effect = match (current, action) {
        (ResourceStatus::Agent(_), A::Approve) => {
            Some(Effect::SetStatus(ResourceStatus::Agent(AgentStatus::Approved)))
        }
        (ResourceStatus::Agent(_), A::Reject) => {
            Some(Effect::SetStatus(ResourceStatus::Agent(AgentStatus::Rejected)))
        }
        (ResourceStatus::Agent(AgentStatus::Approved | AgentStatus::Featured), A::Feature) => {
            Some(Effect::SetStatus(ResourceStatus::Agent(AgentStatus::Featured)))
        }
        (ResourceStatus::Agent(AgentStatus::Featured), A::Unfeature) => {
            Some(Effect::SetStatus(ResourceStatus::Agent(AgentStatus::Approved)))
        }
        (ResourceStatus::Agent(_), A::Flag) => {
            Some(Effect::SetStatus(ResourceStatus::Agent(AgentStatus::Flagged)))
        }
        (ResourceStatus::Agent(_), A::Delete) => Some(Effect::Remove),

        (ResourceStatus::Review(_), A::Approve) => {
            Some(Effect::SetStatus(ResourceStatus::Review(ReviewStatus::Approved)))
        }
        (ResourceStatus::Review(_), A::Reject) => {
            Some(Effect::SetStatus(ResourceStatus::Review(ReviewStatus::Rejected)))
        }
        (ResourceStatus::Review(_), A::Flag) => {
            Some(Effect::SetStatus(ResourceStatus::Review(ReviewStatus::Flagged)))
        }
        (ResourceStatus::Review(_), A::Delete) => Some(Effect::Remove),

        (
            ResourceStatus::Account(
                AccountStatus::Active | AccountStatus::Flagged | AccountStatus::Suspended,
            ),
            A::Suspend,
        ) => Some(Effect::SetStatus(ResourceStatus::Account(AccountStatus::Suspended))),
        (ResourceStatus::Account(_), A::Ban) => {
            Some(Effect::SetStatus(ResourceStatus::Account(AccountStatus::Banned)))
        }
        (ResourceStatus::Account(_), A::Activate) => {
            Some(Effect::SetStatus(ResourceStatus::Account(AccountStatus::Active)))
        }
        (ResourceStatus::Account(AccountStatus::Active | AccountStatus::Flagged), A::Flag) => {
            Some(Effect::SetStatus(ResourceStatus::Account(AccountStatus::Flagged)))
        }
        (ResourceStatus::Account(_), A::AssignRole) => Some(Effect::AssignRole),
        (ResourceStatus::Account(_), A::RemoveRole) => Some(Effect::ClearRole),
        (ResourceStatus::Account(_), A::SendNotification) => Some(Effect::Notify),

        _ => None,
    };

    effect.ok_or_else(|| {
        DirectoryError::InvalidTransition(format!(
            "Cannot {} {} in status {}",
            action, resource_type, current
        ))
    })
}
