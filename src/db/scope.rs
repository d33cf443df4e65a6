use uuid::Uuid;

/// A workspace id that has already passed the authorization gate.
///
/// Repository methods that read or write workspace-owned rows (members, API
/// keys, audit entries) take a `WorkspaceScope` rather than a bare `Uuid`, and
/// every such query filters on `scope.workspace_id()`. Only the gate and the
/// workspace-creation path mint scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspaceScope(Uuid);

impl WorkspaceScope {
    pub(crate) fn authorized(workspace_id: Uuid) -> Self {
        Self(workspace_id)
    }

    pub fn workspace_id(&self) -> Uuid {
        self.0
    }
}
