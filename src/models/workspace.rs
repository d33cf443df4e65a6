use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, Default)]
#[sqlx(type_name = "workspace_plan")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorkspacePlan {
    #[default]
    Free,
    Pro,
}

impl WorkspacePlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspacePlan::Free => "free",
            WorkspacePlan::Pro => "pro",
        }
    }
}

/// Role stored on a membership row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "membership_role")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Admin,
    Member,
}

impl MembershipRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(MembershipRole::Admin),
            "member" => Some(MembershipRole::Member),
            _ => None,
        }
    }
}

/// Effective role of a user inside one workspace. `Owner` is never stored;
/// it comes from `Workspace::owner_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceRole {
    Owner,
    Admin,
    Member,
}

impl WorkspaceRole {
    fn rank(self) -> u8 {
        match self {
            WorkspaceRole::Member => 1,
            WorkspaceRole::Admin => 2,
            WorkspaceRole::Owner => 3,
        }
    }

    pub fn satisfies(self, minimum: WorkspaceRole) -> bool {
        self.rank() >= minimum.rank()
    }
}

impl From<MembershipRole> for WorkspaceRole {
    fn from(role: MembershipRole) -> Self {
        match role {
            MembershipRole::Admin => WorkspaceRole::Admin,
            MembershipRole::Member => WorkspaceRole::Member,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub owner_id: Uuid,
    pub plan: WorkspacePlan,
    pub billing_customer_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub upgraded_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Workspace {
    pub fn is_pro(&self) -> bool {
        self.plan == WorkspacePlan::Pro
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Membership {
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub role: MembershipRole,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Row returned by the paginated member listing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemberSummary {
    pub user_id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub role: MembershipRole,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMembershipSummary {
    pub workspace: Workspace,
    pub role: WorkspaceRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkspaceOverview {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub plan: WorkspacePlan,
    pub owner_id: Uuid,
    pub owner_email: String,
    pub member_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceStats {
    pub member_count: i64,
    pub active_api_keys: i64,
    pub plan: WorkspacePlan,
}

/// Result of the idempotent pro upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Upgraded,
    AlreadyPro,
    NotFound,
}

/// Which downgrade rule a billing event applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DowngradeRule {
    /// Subscription cancellation: set free even if already free.
    Always,
    /// Payment failure: only touch workspaces that are currently pro.
    OnlyIfPro,
}

/// Lowercase ASCII slug with single hyphens; never empty.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("workspace");
    }
    slug
}
