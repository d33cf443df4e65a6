use uuid::Uuid;

use crate::db::workspace_repository::WorkspaceRepository;
use crate::models::workspace::{Workspace, WorkspaceRole};

/// Effective role of `user_id` in `workspace`: the owner column wins over any
/// stored membership row.
pub async fn resolve_role(
    repo: &dyn WorkspaceRepository,
    user_id: Uuid,
    workspace: &Workspace,
) -> Result<Option<WorkspaceRole>, sqlx::Error> {
    if workspace.owner_id == user_id {
        return Ok(Some(WorkspaceRole::Owner));
    }
    Ok(repo
        .find_membership(workspace.id, user_id)
        .await?
        .map(|m| WorkspaceRole::from(m.role)))
}
