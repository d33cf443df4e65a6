use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{
    activity_repository::ActivityRepository,
    api_key_repository::ApiKeyRepository,
    billing_event_repository::BillingEventRepository,
    scope::WorkspaceScope,
    session_repository::SessionRepository,
    user_repository::UserRepository,
    workspace_repository::{PlanCounts, WorkspaceRepository},
};
use crate::models::activity::{Activity, NewActivity};
use crate::models::api_key::ApiKey;
use crate::models::billing_event::BillingEvent;
use crate::models::session::{NewSession, UserSession};
use crate::models::user::{NewUser, User, UserConflict, UserMutation, UserUpdate};
use crate::models::workspace::{
    DowngradeRule, MemberSummary, Membership, MembershipRole, UpgradeOutcome, Workspace,
    WorkspaceMembershipSummary, WorkspaceOverview, WorkspacePlan, WorkspaceRole, WorkspaceStats,
};

/// In-memory store implementing every repository trait with the same
/// uniqueness and transactional outcomes as the Postgres implementations.
#[derive(Default)]
pub struct MockDb {
    pub users: Mutex<Vec<User>>,
    pub workspaces: Mutex<Vec<Workspace>>,
    pub memberships: Mutex<Vec<Membership>>,
    pub api_keys: Mutex<Vec<ApiKey>>,
    pub billing_events: Mutex<HashSet<String>>,
    pub sessions: Mutex<Vec<UserSession>>,
    pub activities: Mutex<Vec<Activity>>,
    pub billing_event_inserts: Mutex<usize>,
    pub plan_writes: Mutex<usize>,
    pub fail_billing_events: bool,
    pub fail_plan_writes: bool,
    pub fail_membership_insert: bool,
}

fn mock_failure() -> sqlx::Error {
    sqlx::Error::Protocol("Mock DB failure".into())
}

/// Stand-in for a Postgres `23505` so callers exercise their retry paths.
#[derive(Debug, thiserror::Error)]
#[error("duplicate key value violates unique constraint \"{constraint}\"")]
struct MockUniqueViolation {
    constraint: &'static str,
}

impl sqlx::error::DatabaseError for MockUniqueViolation {
    fn message(&self) -> &str {
        "duplicate key value violates unique constraint"
    }

    fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
        Some(std::borrow::Cow::Borrowed("23505"))
    }

    fn constraint(&self) -> Option<&str> {
        Some(self.constraint)
    }

    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> sqlx::error::ErrorKind {
        sqlx::error::ErrorKind::UniqueViolation
    }
}

fn unique_violation(constraint: &'static str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(MockUniqueViolation { constraint }))
}

fn new_user_row(new_user: &NewUser) -> User {
    User {
        id: Uuid::new_v4(),
        email: new_user.email.clone(),
        username: new_user.username.clone(),
        name: new_user.name.clone(),
        password_hash: new_user.password_hash.clone(),
        is_superadmin: new_user.is_superadmin,
        active: true,
        last_login_at: None,
        current_login_at: None,
        last_login_ip: None,
        current_login_ip: None,
        login_count: 0,
        created_at: OffsetDateTime::now_utc(),
    }
}

fn conflict_for(users: &[User], new_user: &NewUser) -> Option<UserConflict> {
    if users
        .iter()
        .any(|u| u.email.eq_ignore_ascii_case(&new_user.email))
    {
        return Some(UserConflict::Email);
    }
    if let Some(username) = &new_user.username {
        if users.iter().any(|u| u.username.as_ref() == Some(username)) {
            return Some(UserConflict::Username);
        }
    }
    None
}

impl MockDb {
    pub fn insert_user(&self, email: &str, is_superadmin: bool) -> User {
        let user = new_user_row(&NewUser {
            email: email.to_string(),
            username: None,
            name: None,
            password_hash: String::new(),
            is_superadmin,
        });
        self.users.lock().unwrap().push(user.clone());
        user
    }

    pub fn insert_user_with_password(&self, email: &str, password: &str) -> User {
        let mut user = self.insert_user(email, false);
        user.password_hash =
            crate::utils::password::hash_password(password).expect("hash should succeed");
        let mut users = self.users.lock().unwrap();
        if let Some(stored) = users.iter_mut().find(|u| u.id == user.id) {
            stored.password_hash = user.password_hash.clone();
        }
        user
    }

    pub fn insert_workspace(&self, name: &str, owner_id: Uuid) -> Workspace {
        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: crate::models::workspace::slugify(name),
            owner_id,
            plan: WorkspacePlan::Free,
            billing_customer_id: None,
            upgraded_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.workspaces.lock().unwrap().push(workspace.clone());
        workspace
    }

    pub fn insert_membership(&self, workspace_id: Uuid, user_id: Uuid, role: MembershipRole) {
        let mut memberships = self.memberships.lock().unwrap();
        memberships.retain(|m| !(m.workspace_id == workspace_id && m.user_id == user_id));
        memberships.push(Membership {
            workspace_id,
            user_id,
            role,
            created_at: OffsetDateTime::now_utc(),
        });
    }

    pub fn workspace(&self, workspace_id: Uuid) -> Workspace {
        self.workspaces
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.id == workspace_id)
            .cloned()
            .expect("workspace should exist")
    }

    pub fn set_plan(&self, workspace_id: Uuid, plan: WorkspacePlan, customer: Option<&str>) {
        let mut workspaces = self.workspaces.lock().unwrap();
        if let Some(ws) = workspaces.iter_mut().find(|w| w.id == workspace_id) {
            ws.plan = plan;
            ws.billing_customer_id = customer.map(str::to_string);
        }
    }

    pub fn user(&self, user_id: Uuid) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
    }

    pub fn activity_actions(&self) -> Vec<String> {
        self.activities
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.action.clone())
            .collect()
    }

    fn superadmin_count(users: &[User]) -> usize {
        users.iter().filter(|u| u.is_superadmin).count()
    }
}

#[async_trait]
impl UserRepository for MockDb {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        Ok(self.user(user_id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, new_user: &NewUser) -> Result<UserMutation<User>, sqlx::Error> {
        let mut users = self.users.lock().unwrap();
        if new_user.is_superadmin && Self::superadmin_count(&users) > 0 {
            return Ok(UserMutation::SecondSuperadmin);
        }
        if let Some(conflict) = conflict_for(&users, new_user) {
            return Ok(UserMutation::Conflict(conflict));
        }
        let user = new_user_row(new_user);
        users.push(user.clone());
        Ok(UserMutation::Applied(user))
    }

    async fn update_user(
        &self,
        user_id: Uuid,
        update: &UserUpdate,
    ) -> Result<UserMutation<User>, sqlx::Error> {
        let mut users = self.users.lock().unwrap();
        let count = Self::superadmin_count(&users);
        let Some(user) = users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(UserMutation::NotFound);
        };
        if let Some(requested) = update.is_superadmin {
            if requested && !user.is_superadmin && count > 0 {
                return Ok(UserMutation::SecondSuperadmin);
            }
            if !requested && user.is_superadmin && count <= 1 {
                return Ok(UserMutation::LastSuperadmin);
            }
            user.is_superadmin = requested;
        }
        if let Some(name) = &update.name {
            user.name = Some(name.clone());
        }
        if let Some(active) = update.active {
            user.active = active;
        }
        Ok(UserMutation::Applied(user.clone()))
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<UserMutation<()>, sqlx::Error> {
        let mut users = self.users.lock().unwrap();
        let count = Self::superadmin_count(&users);
        let Some(user) = users.iter().find(|u| u.id == user_id) else {
            return Ok(UserMutation::NotFound);
        };
        if user.is_superadmin && count <= 1 {
            return Ok(UserMutation::LastSuperadmin);
        }

        let owned: Vec<Uuid> = {
            let mut workspaces = self.workspaces.lock().unwrap();
            let owned = workspaces
                .iter()
                .filter(|w| w.owner_id == user_id)
                .map(|w| w.id)
                .collect::<Vec<_>>();
            workspaces.retain(|w| w.owner_id != user_id);
            owned
        };
        self.memberships
            .lock()
            .unwrap()
            .retain(|m| m.user_id != user_id && !owned.contains(&m.workspace_id));
        self.api_keys
            .lock()
            .unwrap()
            .retain(|k| k.user_id != user_id && !owned.contains(&k.workspace_id));
        self.sessions.lock().unwrap().retain(|s| s.user_id != user_id);
        users.retain(|u| u.id != user_id);
        Ok(UserMutation::Applied(()))
    }

    async fn record_login(&self, user_id: Uuid, ip: Option<&str>) -> Result<User, sqlx::Error> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        user.last_login_at = user.current_login_at;
        user.last_login_ip = user.current_login_ip.take();
        user.current_login_at = Some(OffsetDateTime::now_utc());
        user.current_login_ip = ip.map(str::to_string);
        user.login_count += 1;
        Ok(user.clone())
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn count_users(&self) -> Result<i64, sqlx::Error> {
        Ok(self.users.lock().unwrap().len() as i64)
    }
}

#[async_trait]
impl WorkspaceRepository for MockDb {
    async fn create_workspace_with_owner(
        &self,
        name: &str,
        slug: &str,
        owner_id: Uuid,
    ) -> Result<Workspace, sqlx::Error> {
        {
            let workspaces = self.workspaces.lock().unwrap();
            if workspaces.iter().any(|w| w.slug == slug) {
                return Err(unique_violation("workspaces_slug_key"));
            }
        }
        let mut workspace = self.insert_workspace(name, owner_id);
        workspace.slug = slug.to_string();
        {
            let mut workspaces = self.workspaces.lock().unwrap();
            if let Some(stored) = workspaces.iter_mut().find(|w| w.id == workspace.id) {
                stored.slug = slug.to_string();
            }
        }
        self.insert_membership(workspace.id, owner_id, MembershipRole::Admin);
        Ok(workspace)
    }

    async fn find_workspace(&self, workspace_id: Uuid) -> Result<Option<Workspace>, sqlx::Error> {
        Ok(self
            .workspaces
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.id == workspace_id)
            .cloned())
    }

    async fn find_membership(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.workspace_id == workspace_id && m.user_id == user_id)
            .cloned())
    }

    async fn list_memberships_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WorkspaceMembershipSummary>, sqlx::Error> {
        let workspaces = self.workspaces.lock().unwrap().clone();
        let memberships = self.memberships.lock().unwrap().clone();
        Ok(workspaces
            .into_iter()
            .filter_map(|workspace| {
                let role = if workspace.owner_id == user_id {
                    WorkspaceRole::Owner
                } else {
                    memberships
                        .iter()
                        .find(|m| m.workspace_id == workspace.id && m.user_id == user_id)
                        .map(|m| WorkspaceRole::from(m.role))?
                };
                Some(WorkspaceMembershipSummary { workspace, role })
            })
            .collect())
    }

    async fn update_workspace_name(
        &self,
        scope: &WorkspaceScope,
        name: &str,
    ) -> Result<Option<Workspace>, sqlx::Error> {
        let mut workspaces = self.workspaces.lock().unwrap();
        Ok(workspaces
            .iter_mut()
            .find(|w| w.id == scope.workspace_id())
            .map(|w| {
                w.name = name.to_string();
                w.clone()
            }))
    }

    async fn workspace_stats(
        &self,
        scope: &WorkspaceScope,
    ) -> Result<WorkspaceStats, sqlx::Error> {
        let id = scope.workspace_id();
        let plan = self
            .workspaces
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.id == id)
            .map(|w| w.plan)
            .ok_or(sqlx::Error::RowNotFound)?;
        let member_count = self
            .memberships
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.workspace_id == id)
            .count() as i64;
        let active_api_keys = self
            .api_keys
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.workspace_id == id && k.is_active)
            .count() as i64;
        Ok(WorkspaceStats {
            member_count,
            active_api_keys,
            plan,
        })
    }

    async fn list_members(
        &self,
        scope: &WorkspaceScope,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<MemberSummary>, i64), sqlx::Error> {
        let users = self.users.lock().unwrap().clone();
        let members: Vec<MemberSummary> = self
            .memberships
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.workspace_id == scope.workspace_id())
            .filter_map(|m| {
                let user = users.iter().find(|u| u.id == m.user_id)?;
                Some(MemberSummary {
                    user_id: user.id,
                    email: user.email.clone(),
                    username: user.username.clone(),
                    name: user.name.clone(),
                    role: m.role,
                    active: user.active,
                    joined_at: m.created_at,
                })
            })
            .collect();
        let total = members.len() as i64;
        let items = members
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((items, total))
    }

    async fn add_member_with_new_user(
        &self,
        scope: &WorkspaceScope,
        new_user: &NewUser,
        role: MembershipRole,
    ) -> Result<UserMutation<User>, sqlx::Error> {
        let mut users = self.users.lock().unwrap();
        if let Some(conflict) = conflict_for(&users, new_user) {
            return Ok(UserMutation::Conflict(conflict));
        }
        // the user row is only kept when the membership write succeeds
        if self.fail_membership_insert {
            return Err(mock_failure());
        }
        let user = new_user_row(new_user);
        users.push(user.clone());
        drop(users);
        self.insert_membership(scope.workspace_id(), user.id, role);
        Ok(UserMutation::Applied(user))
    }

    async fn set_member_role(
        &self,
        scope: &WorkspaceScope,
        user_id: Uuid,
        role: MembershipRole,
    ) -> Result<bool, sqlx::Error> {
        let mut memberships = self.memberships.lock().unwrap();
        match memberships
            .iter_mut()
            .find(|m| m.workspace_id == scope.workspace_id() && m.user_id == user_id)
        {
            Some(m) => {
                m.role = role;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_member(
        &self,
        scope: &WorkspaceScope,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let mut memberships = self.memberships.lock().unwrap();
        let before = memberships.len();
        memberships.retain(|m| !(m.workspace_id == scope.workspace_id() && m.user_id == user_id));
        Ok(memberships.len() != before)
    }

    async fn upgrade_to_pro(
        &self,
        workspace_id: Uuid,
        billing_customer_id: Option<&str>,
    ) -> Result<UpgradeOutcome, sqlx::Error> {
        let mut workspaces = self.workspaces.lock().unwrap();
        let Some(ws) = workspaces.iter_mut().find(|w| w.id == workspace_id) else {
            return Ok(UpgradeOutcome::NotFound);
        };
        if ws.plan == WorkspacePlan::Pro {
            return Ok(UpgradeOutcome::AlreadyPro);
        }
        if self.fail_plan_writes {
            return Err(mock_failure());
        }
        ws.plan = WorkspacePlan::Pro;
        ws.billing_customer_id = billing_customer_id.map(str::to_string);
        ws.upgraded_at = Some(OffsetDateTime::now_utc());
        *self.plan_writes.lock().unwrap() += 1;
        Ok(UpgradeOutcome::Upgraded)
    }

    async fn downgrade_by_customer(
        &self,
        billing_customer_id: &str,
        rule: DowngradeRule,
    ) -> Result<Vec<Workspace>, sqlx::Error> {
        if self.fail_plan_writes {
            return Err(mock_failure());
        }
        let mut workspaces = self.workspaces.lock().unwrap();
        let mut changed = Vec::new();
        for ws in workspaces
            .iter_mut()
            .filter(|w| w.billing_customer_id.as_deref() == Some(billing_customer_id))
        {
            if rule == DowngradeRule::OnlyIfPro && ws.plan != WorkspacePlan::Pro {
                continue;
            }
            ws.plan = WorkspacePlan::Free;
            *self.plan_writes.lock().unwrap() += 1;
            changed.push(ws.clone());
        }
        Ok(changed)
    }

    async fn list_workspace_overviews(&self) -> Result<Vec<WorkspaceOverview>, sqlx::Error> {
        let users = self.users.lock().unwrap().clone();
        let memberships = self.memberships.lock().unwrap().clone();
        Ok(self
            .workspaces
            .lock()
            .unwrap()
            .iter()
            .map(|w| WorkspaceOverview {
                id: w.id,
                name: w.name.clone(),
                slug: w.slug.clone(),
                plan: w.plan,
                owner_id: w.owner_id,
                owner_email: users
                    .iter()
                    .find(|u| u.id == w.owner_id)
                    .map(|u| u.email.clone())
                    .unwrap_or_default(),
                member_count: memberships
                    .iter()
                    .filter(|m| m.workspace_id == w.id)
                    .count() as i64,
                created_at: w.created_at,
            })
            .collect())
    }

    async fn count_workspaces(&self) -> Result<PlanCounts, sqlx::Error> {
        let workspaces = self.workspaces.lock().unwrap();
        Ok(PlanCounts {
            total: workspaces.len() as i64,
            pro: workspaces.iter().filter(|w| w.is_pro()).count() as i64,
        })
    }
}

#[async_trait]
impl ApiKeyRepository for MockDb {
    async fn create_key(
        &self,
        scope: &WorkspaceScope,
        user_id: Uuid,
        name: &str,
        prefix: &str,
        key_hash: &str,
    ) -> Result<ApiKey, sqlx::Error> {
        let key = ApiKey {
            id: Uuid::new_v4(),
            workspace_id: scope.workspace_id(),
            user_id,
            name: name.to_string(),
            prefix: prefix.to_string(),
            key_hash: key_hash.to_string(),
            is_active: true,
            last_used_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.api_keys.lock().unwrap().push(key.clone());
        Ok(key)
    }

    async fn list_keys(&self, scope: &WorkspaceScope) -> Result<Vec<ApiKey>, sqlx::Error> {
        Ok(self
            .api_keys
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.workspace_id == scope.workspace_id())
            .cloned()
            .collect())
    }

    async fn revoke_key(&self, scope: &WorkspaceScope, key_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut keys = self.api_keys.lock().unwrap();
        match keys
            .iter_mut()
            .find(|k| k.id == key_id && k.workspace_id == scope.workspace_id())
        {
            Some(key) => {
                key.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_active_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, sqlx::Error> {
        Ok(self
            .api_keys
            .lock()
            .unwrap()
            .iter()
            .find(|k| k.key_hash == key_hash && k.is_active)
            .cloned())
    }

    async fn touch_last_used(&self, key_id: Uuid) -> Result<(), sqlx::Error> {
        let mut keys = self.api_keys.lock().unwrap();
        if let Some(key) = keys.iter_mut().find(|k| k.id == key_id) {
            key.last_used_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn count_active_keys(&self) -> Result<i64, sqlx::Error> {
        Ok(self
            .api_keys
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.is_active)
            .count() as i64)
    }
}

#[async_trait]
impl BillingEventRepository for MockDb {
    async fn record_event(
        &self,
        event_id: &str,
        event_type: Option<&str>,
        provider: &str,
    ) -> Result<Option<BillingEvent>, sqlx::Error> {
        if self.fail_billing_events {
            return Err(mock_failure());
        }
        *self.billing_event_inserts.lock().unwrap() += 1;
        if !self
            .billing_events
            .lock()
            .unwrap()
            .insert(event_id.to_string())
        {
            return Ok(None);
        }
        Ok(Some(BillingEvent {
            id: Uuid::new_v4(),
            event_id: event_id.to_string(),
            event_type: event_type.map(str::to_string),
            provider: provider.to_string(),
            created_at: OffsetDateTime::now_utc(),
        }))
    }
}

#[async_trait]
impl SessionRepository for MockDb {
    async fn upsert_session(&self, session: &NewSession) -> Result<UserSession, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(existing) = sessions
            .iter_mut()
            .find(|s| s.session_token == session.session_token)
        {
            existing.last_active = now;
            existing.expires_at = session.expires_at;
            existing.ip_address = session.ip_address.clone();
            existing.meta = session.meta.clone();
            existing.is_active = true;
            return Ok(existing.clone());
        }
        let row = UserSession {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            session_token: session.session_token.clone(),
            current_workspace_id: None,
            last_active: now,
            expires_at: session.expires_at,
            ip_address: session.ip_address.clone(),
            meta: session.meta.clone(),
            is_active: true,
            created_at: now,
        };
        sessions.push(row.clone());
        Ok(row)
    }

    async fn find_active_session(
        &self,
        token: &str,
    ) -> Result<Option<UserSession>, sqlx::Error> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.session_token == token && s.is_active)
            .cloned())
    }

    async fn touch_session(&self, token: &str) -> Result<(), sqlx::Error> {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(s) = sessions.iter_mut().find(|s| s.session_token == token) {
            s.last_active = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn set_current_workspace(
        &self,
        token: &str,
        workspace_id: Option<Uuid>,
    ) -> Result<(), sqlx::Error> {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(s) = sessions.iter_mut().find(|s| s.session_token == token) {
            s.current_workspace_id = workspace_id;
        }
        Ok(())
    }

    async fn deactivate_session(&self, token: &str) -> Result<(), sqlx::Error> {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(s) = sessions.iter_mut().find(|s| s.session_token == token) {
            s.is_active = false;
        }
        Ok(())
    }

    async fn deactivate_other_sessions(
        &self,
        user_id: Uuid,
        keep_token: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let mut count = 0;
        for s in self.sessions.lock().unwrap().iter_mut() {
            if s.user_id == user_id && s.is_active && Some(s.session_token.as_str()) != keep_token
            {
                s.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<UserSession>, sqlx::Error> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == user_id && s.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ActivityRepository for MockDb {
    async fn record(&self, activity: &NewActivity) -> Result<(), sqlx::Error> {
        self.activities.lock().unwrap().push(Activity {
            id: Uuid::new_v4(),
            user_id: activity.user_id,
            workspace_id: activity.workspace_id,
            action: activity.action.clone(),
            data: activity.data.clone(),
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    async fn list_for_workspace(
        &self,
        scope: &WorkspaceScope,
        limit: i64,
    ) -> Result<Vec<Activity>, sqlx::Error> {
        let mut items: Vec<Activity> = self
            .activities
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.workspace_id == Some(scope.workspace_id()))
            .cloned()
            .collect();
        items.reverse();
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }
}
