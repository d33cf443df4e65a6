use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::postgres_user_repository::{insert_user, user_conflict};
use crate::db::scope::WorkspaceScope;
use crate::models::user::{NewUser, User, UserMutation};
use crate::models::workspace::{
    DowngradeRule, MemberSummary, Membership, MembershipRole, UpgradeOutcome, Workspace,
    WorkspaceMembershipSummary, WorkspaceOverview, WorkspacePlan, WorkspaceRole, WorkspaceStats,
};

use super::workspace_repository::{PlanCounts, WorkspaceRepository};

const WORKSPACE_COLUMNS: &str =
    "w.id, w.name, w.slug, w.owner_id, w.plan, w.billing_customer_id, w.upgraded_at, w.created_at";

pub struct PostgresWorkspaceRepository {
    pub pool: PgPool,
}

#[derive(FromRow)]
struct MembershipRow {
    #[sqlx(flatten)]
    workspace: Workspace,
    role: String,
}

#[derive(FromRow)]
struct StatsRow {
    member_count: i64,
    active_api_keys: i64,
    plan: WorkspacePlan,
}

fn role_from_text(role: &str) -> WorkspaceRole {
    match role {
        "owner" => WorkspaceRole::Owner,
        "admin" => WorkspaceRole::Admin,
        _ => WorkspaceRole::Member,
    }
}

#[async_trait]
impl WorkspaceRepository for PostgresWorkspaceRepository {
    async fn create_workspace_with_owner(
        &self,
        name: &str,
        slug: &str,
        owner_id: Uuid,
    ) -> Result<Workspace, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO workspaces AS w (id, name, slug, owner_id) VALUES ($1, $2, $3, $4) \
             RETURNING {WORKSPACE_COLUMNS}"
        );
        let workspace = sqlx::query_as::<_, Workspace>(&sql)
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(slug)
            .bind(owner_id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO memberships (workspace_id, user_id, role)
            VALUES ($1, $2, 'admin')
            ON CONFLICT (workspace_id, user_id) DO UPDATE SET role = EXCLUDED.role
            "#,
        )
        .bind(workspace.id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(workspace)
    }

    async fn find_workspace(&self, workspace_id: Uuid) -> Result<Option<Workspace>, sqlx::Error> {
        let sql = format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces w WHERE w.id = $1");
        sqlx::query_as::<_, Workspace>(&sql)
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_membership(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"
            SELECT workspace_id, user_id, role, created_at
            FROM memberships
            WHERE workspace_id = $1 AND user_id = $2
            "#,
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_memberships_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WorkspaceMembershipSummary>, sqlx::Error> {
        let sql = format!(
            "SELECT {WORKSPACE_COLUMNS}, \
                    CASE WHEN w.owner_id = $1 THEN 'owner' ELSE m.role::text END AS role \
             FROM workspaces w \
             LEFT JOIN memberships m ON m.workspace_id = w.id AND m.user_id = $1 \
             WHERE w.owner_id = $1 OR m.user_id = $1 \
             ORDER BY w.created_at ASC"
        );
        let rows = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| WorkspaceMembershipSummary {
                role: role_from_text(&row.role),
                workspace: row.workspace,
            })
            .collect())
    }

    async fn update_workspace_name(
        &self,
        scope: &WorkspaceScope,
        name: &str,
    ) -> Result<Option<Workspace>, sqlx::Error> {
        let sql = format!(
            "UPDATE workspaces AS w SET name = $2 WHERE w.id = $1 RETURNING {WORKSPACE_COLUMNS}"
        );
        sqlx::query_as::<_, Workspace>(&sql)
            .bind(scope.workspace_id())
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    async fn workspace_stats(
        &self,
        scope: &WorkspaceScope,
    ) -> Result<WorkspaceStats, sqlx::Error> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM memberships WHERE workspace_id = w.id) AS member_count,
                (SELECT COUNT(*) FROM api_keys WHERE workspace_id = w.id AND is_active) AS active_api_keys,
                w.plan
            FROM workspaces w
            WHERE w.id = $1
            "#,
        )
        .bind(scope.workspace_id())
        .fetch_one(&self.pool)
        .await?;

        Ok(WorkspaceStats {
            member_count: row.member_count,
            active_api_keys: row.active_api_keys,
            plan: row.plan,
        })
    }

    async fn list_members(
        &self,
        scope: &WorkspaceScope,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<MemberSummary>, i64), sqlx::Error> {
        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM memberships WHERE workspace_id = $1")
                .bind(scope.workspace_id())
                .fetch_one(&self.pool)
                .await?;

        let items = sqlx::query_as::<_, MemberSummary>(
            r#"
            SELECT u.id AS user_id, u.email, u.username, u.name, m.role, u.active,
                   m.created_at AS joined_at
            FROM memberships m
            JOIN users u ON u.id = m.user_id
            WHERE m.workspace_id = $1
            ORDER BY m.created_at ASC, u.email ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(scope.workspace_id())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((items, total))
    }

    async fn add_member_with_new_user(
        &self,
        scope: &WorkspaceScope,
        new_user: &NewUser,
        role: MembershipRole,
    ) -> Result<UserMutation<User>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let user = match insert_user(&mut tx, new_user).await {
            Ok(user) => user,
            Err(err) => {
                if let Some(conflict) = user_conflict(&err) {
                    return Ok(UserMutation::Conflict(conflict));
                }
                return Err(err);
            }
        };

        sqlx::query("INSERT INTO memberships (workspace_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(scope.workspace_id())
            .bind(user.id)
            .bind(role)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(UserMutation::Applied(user))
    }

    async fn set_member_role(
        &self,
        scope: &WorkspaceScope,
        user_id: Uuid,
        role: MembershipRole,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE memberships SET role = $3 WHERE workspace_id = $1 AND user_id = $2")
                .bind(scope.workspace_id())
                .bind(user_id)
                .bind(role)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_member(
        &self,
        scope: &WorkspaceScope,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM memberships WHERE workspace_id = $1 AND user_id = $2")
            .bind(scope.workspace_id())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upgrade_to_pro(
        &self,
        workspace_id: Uuid,
        billing_customer_id: Option<&str>,
    ) -> Result<UpgradeOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let plan = sqlx::query_scalar::<_, WorkspacePlan>(
            "SELECT plan FROM workspaces WHERE id = $1 FOR UPDATE",
        )
        .bind(workspace_id)
        .fetch_optional(&mut *tx)
        .await?;

        match plan {
            None => return Ok(UpgradeOutcome::NotFound),
            Some(WorkspacePlan::Pro) => return Ok(UpgradeOutcome::AlreadyPro),
            Some(WorkspacePlan::Free) => {}
        }

        sqlx::query(
            r#"
            UPDATE workspaces
            SET plan = 'pro', billing_customer_id = $2, upgraded_at = now()
            WHERE id = $1
            "#,
        )
        .bind(workspace_id)
        .bind(billing_customer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(UpgradeOutcome::Upgraded)
    }

    async fn downgrade_by_customer(
        &self,
        billing_customer_id: &str,
        rule: DowngradeRule,
    ) -> Result<Vec<Workspace>, sqlx::Error> {
        let filter = match rule {
            DowngradeRule::Always => "",
            DowngradeRule::OnlyIfPro => " AND w.plan = 'pro'",
        };
        let sql = format!(
            "UPDATE workspaces AS w SET plan = 'free' \
             WHERE w.billing_customer_id = $1{filter} RETURNING {WORKSPACE_COLUMNS}"
        );
        sqlx::query_as::<_, Workspace>(&sql)
            .bind(billing_customer_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn list_workspace_overviews(&self) -> Result<Vec<WorkspaceOverview>, sqlx::Error> {
        sqlx::query_as::<_, WorkspaceOverview>(
            r#"
            SELECT w.id, w.name, w.slug, w.plan, w.owner_id, u.email AS owner_email,
                   (SELECT COUNT(*) FROM memberships m WHERE m.workspace_id = w.id) AS member_count,
                   w.created_at
            FROM workspaces w
            JOIN users u ON u.id = w.owner_id
            ORDER BY w.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn count_workspaces(&self) -> Result<PlanCounts, sqlx::Error> {
        let (total, pro) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE plan = 'pro') FROM workspaces",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(PlanCounts { total, pro })
    }
}
