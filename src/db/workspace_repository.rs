use async_trait::async_trait;
use uuid::Uuid;

use crate::db::scope::WorkspaceScope;
use crate::models::user::{NewUser, User, UserMutation};
use crate::models::workspace::{
    DowngradeRule, MemberSummary, Membership, MembershipRole, UpgradeOutcome, Workspace,
    WorkspaceMembershipSummary, WorkspaceOverview, WorkspaceStats,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanCounts {
    pub total: i64,
    pub pro: i64,
}

#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    /// Inserts the workspace and the owner's admin membership in one transaction.
    /// A taken slug surfaces as a unique violation.
    async fn create_workspace_with_owner(
        &self,
        name: &str,
        slug: &str,
        owner_id: Uuid,
    ) -> Result<Workspace, sqlx::Error>;

    async fn find_workspace(&self, workspace_id: Uuid) -> Result<Option<Workspace>, sqlx::Error>;

    async fn find_membership(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error>;

    /// Workspaces the user owns or belongs to, with the effective role.
    async fn list_memberships_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WorkspaceMembershipSummary>, sqlx::Error>;

    async fn update_workspace_name(
        &self,
        scope: &WorkspaceScope,
        name: &str,
    ) -> Result<Option<Workspace>, sqlx::Error>;

    async fn workspace_stats(&self, scope: &WorkspaceScope)
        -> Result<WorkspaceStats, sqlx::Error>;

    async fn list_members(
        &self,
        scope: &WorkspaceScope,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<MemberSummary>, i64), sqlx::Error>;

    /// Creates a user and their membership atomically; nothing persists if either
    /// write fails.
    async fn add_member_with_new_user(
        &self,
        scope: &WorkspaceScope,
        new_user: &NewUser,
        role: MembershipRole,
    ) -> Result<UserMutation<User>, sqlx::Error>;

    /// Returns `false` when the user has no membership in the scope.
    async fn set_member_role(
        &self,
        scope: &WorkspaceScope,
        user_id: Uuid,
        role: MembershipRole,
    ) -> Result<bool, sqlx::Error>;

    async fn remove_member(&self, scope: &WorkspaceScope, user_id: Uuid)
        -> Result<bool, sqlx::Error>;

    /// Idempotent upgrade: a workspace that is already pro is left untouched.
    async fn upgrade_to_pro(
        &self,
        workspace_id: Uuid,
        billing_customer_id: Option<&str>,
    ) -> Result<UpgradeOutcome, sqlx::Error>;

    /// Sets matching workspaces to free and returns the rows that changed.
    async fn downgrade_by_customer(
        &self,
        billing_customer_id: &str,
        rule: DowngradeRule,
    ) -> Result<Vec<Workspace>, sqlx::Error>;

    async fn list_workspace_overviews(&self) -> Result<Vec<WorkspaceOverview>, sqlx::Error>;

    async fn count_workspaces(&self) -> Result<PlanCounts, sqlx::Error>;
}
