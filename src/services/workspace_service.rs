use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::is_unique_violation;
use crate::db::workspace_repository::WorkspaceRepository;
use crate::errors::AppError;
use crate::models::workspace::{slugify, Workspace};

const MAX_SLUG_ATTEMPTS: usize = 5;

/// Creates a workspace and its owner's admin membership, retrying with a
/// random suffix when the derived slug is taken.
pub async fn create_workspace(
    repo: &dyn WorkspaceRepository,
    name: &str,
    owner_id: Uuid,
) -> Result<Workspace, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Workspace name is required"));
    }

    let base = slugify(name);
    let mut slug = base.clone();
    for attempt in 1..=MAX_SLUG_ATTEMPTS {
        match repo.create_workspace_with_owner(name, &slug, owner_id).await {
            Ok(workspace) => {
                info!(workspace_id = %workspace.id, %owner_id, slug = %workspace.slug, "workspace created");
                return Ok(workspace);
            }
            Err(err) if is_unique_violation(&err) => {
                warn!(%slug, attempt, "workspace slug taken, retrying");
                slug = format!("{base}-{:04x}", rand::rng().random::<u16>());
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(AppError::Conflict(
        "Could not allocate a unique workspace slug".to_string(),
    ))
}
