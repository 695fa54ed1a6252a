use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use praetor_core::{AppError, AppResult, PrincipalId, RoleId, TenantId};
use praetor_domain::{
    AdminPrincipal, AuditAction, AuditEntry, Permission, Role, RoleAssignment, RoleGraph, RoleName,
};
use tokio::sync::Mutex;

use crate::{
    AuditLogQuery, AuditRecorder, AuditRepository, EngineConfig, PermissionCache,
    PermissionCacheKey, PrincipalRepository, PrincipalUpsert, ResolvedPermissions,
    RoleAssignmentRepository, RoleRepository,
};

#[derive(Default)]
struct FakeState {
    roles: HashMap<RoleId, Role>,
    assignments: Vec<RoleAssignment>,
    principals: HashMap<PrincipalId, AdminPrincipal>,
}

impl FakeState {
    fn live_role(&self, role_id: RoleId) -> AppResult<Role> {
        self.roles
            .get(&role_id)
            .filter(|role| !role.is_deleted())
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))
    }

    fn principal_mut(&mut self, principal_id: PrincipalId) -> AppResult<&mut AdminPrincipal> {
        self.principals
            .get_mut(&principal_id)
            .ok_or_else(|| AppError::NotFound(format!("principal '{principal_id}' was not found")))
    }

    fn bump_principals_holding(&mut self, role_ids: &[RoleId]) {
        let holders = self
            .assignments
            .iter()
            .filter(|assignment| role_ids.contains(&assignment.role_id))
            .map(|assignment| assignment.principal_id)
            .collect::<BTreeSet<_>>();

        for principal_id in holders {
            if let Some(principal) = self.principals.get_mut(&principal_id) {
                principal.assignment_version += 1;
            }
        }
    }

    fn has_global_grant(&self, role_id: RoleId) -> bool {
        self.assignments
            .iter()
            .any(|assignment| assignment.role_id == role_id && assignment.tenant_id.is_none())
    }

    fn apply_role_edit(
        &mut self,
        role_id: RoleId,
        expected_version: i64,
        max_depth: usize,
        edit: impl FnOnce(&mut Role),
    ) -> AppResult<Role> {
        let current = self.live_role(role_id)?;
        if current.version != expected_version {
            return Err(AppError::Conflict(format!(
                "role '{role_id}' was modified concurrently"
            )));
        }

        let mut next = self.roles.clone();
        let mut updated = current;
        edit(&mut updated);
        updated.version += 1;
        next.insert(role_id, updated.clone());

        let graph = RoleGraph::new(next.values().cloned(), max_depth);
        graph.revalidate_chain(role_id)?;

        let mut affected = graph.descendants(role_id);
        affected.push(role_id);
        graph.ensure_global_grants_allowed(affected.iter().copied(), |affected_id| {
            self.has_global_grant(affected_id)
        })?;
        self.roles = next;
        self.bump_principals_holding(&affected);

        Ok(updated)
    }
}

/// Single in-process store backing every rbac port in service tests.
#[derive(Default)]
pub(crate) struct FakeRbacStore {
    state: Mutex<FakeState>,
}

impl FakeRbacStore {
    pub(crate) async fn seed_role(
        &self,
        name: &str,
        parent_role_id: Option<RoleId>,
        permissions: &[&str],
    ) -> Role {
        let role = Role {
            id: RoleId::new(),
            name: RoleName::new(name).unwrap_or_else(|_| unreachable!()),
            description: String::new(),
            is_system_role: false,
            parent_role_id,
            permissions: permissions
                .iter()
                .map(|value| Permission::from_transport(value).unwrap_or_else(|_| unreachable!()))
                .collect(),
            version: 1,
            deleted_at: None,
        };

        self.state
            .lock()
            .await
            .roles
            .insert(role.id, role.clone());
        role
    }

    pub(crate) async fn seed_principal(&self) -> AdminPrincipal {
        let principal = AdminPrincipal {
            id: PrincipalId::new(),
            external_identity_ref: format!("idp|{}", PrincipalId::new()),
            email: None,
            is_active: true,
            is_super_admin: false,
            require_mfa: false,
            allowed_ip_ranges: Vec::new(),
            last_login_at: None,
            assignment_version: 1,
        };

        self.state
            .lock()
            .await
            .principals
            .insert(principal.id, principal.clone());
        principal
    }

    pub(crate) async fn seed_assignment(
        &self,
        principal_id: PrincipalId,
        role_id: RoleId,
        tenant_id: Option<TenantId>,
        expires_at: Option<DateTime<Utc>>,
    ) -> RoleAssignment {
        let assignment = RoleAssignment {
            id: praetor_core::AssignmentId::new(),
            principal_id,
            role_id,
            tenant_id,
            granted_by_id: principal_id,
            granted_at: Utc::now(),
            expires_at,
        };

        self.state.lock().await.assignments.push(assignment.clone());
        assignment
    }

    pub(crate) async fn force_parent(&self, role_id: RoleId, parent_role_id: Option<RoleId>) {
        if let Some(role) = self.state.lock().await.roles.get_mut(&role_id) {
            role.parent_role_id = parent_role_id;
        }
    }

    pub(crate) async fn assignment_count(&self) -> usize {
        self.state.lock().await.assignments.len()
    }

    pub(crate) async fn principal(&self, principal_id: PrincipalId) -> Option<AdminPrincipal> {
        self.state.lock().await.principals.get(&principal_id).cloned()
    }
}

#[async_trait]
impl RoleRepository for FakeRbacStore {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        Ok(self
            .state
            .lock()
            .await
            .roles
            .values()
            .filter(|role| !role.is_deleted())
            .cloned()
            .collect())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.state.lock().await.live_role(role_id).ok())
    }

    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        Ok(self
            .state
            .lock()
            .await
            .roles
            .values()
            .find(|role| !role.is_deleted() && role.name.as_str() == name)
            .cloned())
    }

    async fn insert_role(&self, role: Role) -> AppResult<Role> {
        let mut state = self.state.lock().await;
        if state
            .roles
            .values()
            .any(|existing| !existing.is_deleted() && existing.name == role.name)
        {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.name
            )));
        }

        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn update_parent(
        &self,
        role_id: RoleId,
        parent_role_id: Option<RoleId>,
        expected_version: i64,
        max_depth: usize,
    ) -> AppResult<Role> {
        let mut state = self.state.lock().await;
        if let Some(parent_role_id) = parent_role_id {
            state.live_role(parent_role_id)?;
        }

        state.apply_role_edit(role_id, expected_version, max_depth, |role| {
            role.parent_role_id = parent_role_id;
        })
    }

    async fn update_permissions(
        &self,
        role_id: RoleId,
        permissions: BTreeSet<Permission>,
        expected_version: i64,
        max_depth: usize,
    ) -> AppResult<Role> {
        self.state
            .lock()
            .await
            .apply_role_edit(role_id, expected_version, max_depth, |role| {
                role.permissions = permissions;
            })
    }

    async fn soft_delete_role(
        &self,
        role_id: RoleId,
        expected_version: i64,
        max_depth: usize,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let current = state.live_role(role_id)?;
        if current.version != expected_version {
            return Err(AppError::Conflict(format!(
                "role '{role_id}' was modified concurrently"
            )));
        }

        let graph = RoleGraph::new(state.roles.values().cloned(), max_depth);
        let mut affected = graph.descendants(role_id);
        let mut remaining = state.roles.clone();
        remaining.remove(&role_id);
        for role in remaining.values_mut() {
            if role.parent_role_id == Some(role_id) {
                role.parent_role_id = None;
            }
        }
        RoleGraph::new(remaining.into_values(), max_depth).ensure_global_grants_allowed(
            affected.iter().copied(),
            |affected_id| state.has_global_grant(affected_id),
        )?;
        affected.push(role_id);

        let deleted_at = Utc::now();
        for role in state.roles.values_mut() {
            if role.id == role_id {
                role.deleted_at = Some(deleted_at);
                role.version += 1;
            } else if role.parent_role_id == Some(role_id) {
                role.parent_role_id = None;
                role.version += 1;
            }
        }
        state.bump_principals_holding(&affected);

        Ok(())
    }
}

#[async_trait]
impl RoleAssignmentRepository for FakeRbacStore {
    async fn insert_assignment(&self, assignment: RoleAssignment) -> AppResult<RoleAssignment> {
        let mut state = self.state.lock().await;
        if state.assignments.iter().any(|existing| {
            existing.principal_id == assignment.principal_id
                && existing.role_id == assignment.role_id
                && existing.tenant_id == assignment.tenant_id
        }) {
            return Err(AppError::DuplicateAssignment {
                principal_id: assignment.principal_id,
                role_id: assignment.role_id,
                tenant_id: assignment.tenant_id,
            });
        }

        state.principal_mut(assignment.principal_id)?.assignment_version += 1;
        state.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn delete_assignment(
        &self,
        principal_id: PrincipalId,
        role_id: RoleId,
        tenant_id: Option<TenantId>,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.assignments.len();
        state.assignments.retain(|assignment| {
            !(assignment.principal_id == principal_id
                && assignment.role_id == role_id
                && assignment.tenant_id == tenant_id)
        });

        let deleted = state.assignments.len() != before;
        if deleted {
            state.principal_mut(principal_id)?.assignment_version += 1;
        }

        Ok(deleted)
    }

    async fn list_assignments_for_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .state
            .lock()
            .await
            .assignments
            .iter()
            .filter(|assignment| assignment.principal_id == principal_id)
            .cloned()
            .collect())
    }

    async fn list_applicable_assignments(
        &self,
        principal_id: PrincipalId,
        tenant_context: Option<TenantId>,
        as_of: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .state
            .lock()
            .await
            .assignments
            .iter()
            .filter(|assignment| {
                assignment.principal_id == principal_id
                    && assignment.applies_to(tenant_context)
                    && assignment.is_active_at(as_of)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PrincipalRepository for FakeRbacStore {
    async fn find_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Option<AdminPrincipal>> {
        Ok(self.state.lock().await.principals.get(&principal_id).cloned())
    }

    async fn find_principal_by_external_ref(
        &self,
        external_ref: &str,
    ) -> AppResult<Option<AdminPrincipal>> {
        Ok(self
            .state
            .lock()
            .await
            .principals
            .values()
            .find(|principal| principal.external_identity_ref == external_ref)
            .cloned())
    }

    async fn upsert_principal(&self, upsert: PrincipalUpsert) -> AppResult<AdminPrincipal> {
        let mut state = self.state.lock().await;
        let existing = state
            .principals
            .values_mut()
            .find(|principal| principal.external_identity_ref == upsert.external_ref);

        if let Some(principal) = existing {
            principal.email = upsert.email;
            principal.is_super_admin = upsert.is_super_admin;
            principal.last_login_at = Some(upsert.login_at);
            return Ok(principal.clone());
        }

        let principal = AdminPrincipal {
            id: PrincipalId::new(),
            external_identity_ref: upsert.external_ref,
            email: upsert.email,
            is_active: true,
            is_super_admin: upsert.is_super_admin,
            require_mfa: false,
            allowed_ip_ranges: Vec::new(),
            last_login_at: Some(upsert.login_at),
            assignment_version: 1,
        };
        state.principals.insert(principal.id, principal.clone());
        Ok(principal)
    }

    async fn set_active(
        &self,
        principal_id: PrincipalId,
        is_active: bool,
    ) -> AppResult<AdminPrincipal> {
        let mut state = self.state.lock().await;
        let principal = state.principal_mut(principal_id)?;
        principal.is_active = is_active;
        principal.assignment_version += 1;
        Ok(principal.clone())
    }

    async fn update_security_settings(
        &self,
        principal_id: PrincipalId,
        require_mfa: bool,
        allowed_ip_ranges: Vec<IpNet>,
    ) -> AppResult<AdminPrincipal> {
        let mut state = self.state.lock().await;
        let principal = state.principal_mut(principal_id)?;
        principal.require_mfa = require_mfa;
        principal.allowed_ip_ranges = allowed_ip_ranges;
        principal.assignment_version += 1;
        Ok(principal.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditRepository {
    entries: Mutex<Vec<AuditEntry>>,
    failing: bool,
}

impl FakeAuditRepository {
    pub(crate) fn failing() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub(crate) async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }

    pub(crate) async fn actions(&self) -> Vec<AuditAction> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|entry| entry.action)
            .collect()
    }
}

#[async_trait]
impl AuditRepository for FakeAuditRepository {
    async fn append_entry(&self, entry: AuditEntry) -> AppResult<()> {
        if self.failing {
            return Err(AppError::Internal("audit sink unavailable".to_owned()));
        }

        self.entries.lock().await.push(entry);
        Ok(())
    }

    async fn list_entries(&self, query: AuditLogQuery) -> AppResult<Vec<AuditEntry>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .rev()
            .filter(|entry| query.action.is_none_or(|action| entry.action == action))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct FakePermissionCache {
    entries: Mutex<HashMap<PermissionCacheKey, ResolvedPermissions>>,
    failing: bool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl FakePermissionCache {
    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionCache for FakePermissionCache {
    async fn get_resolution(
        &self,
        key: PermissionCacheKey,
    ) -> AppResult<Option<ResolvedPermissions>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(AppError::Internal("cache unavailable".to_owned()));
        }

        Ok(self.entries.lock().await.get(&key).cloned())
    }

    async fn set_resolution(
        &self,
        key: PermissionCacheKey,
        resolution: &ResolvedPermissions,
        ttl_seconds: u32,
    ) -> AppResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(AppError::Internal("cache unavailable".to_owned()));
        }

        if ttl_seconds > 0 {
            self.entries.lock().await.insert(key, resolution.clone());
        }
        Ok(())
    }
}

pub(crate) struct Fixture {
    pub(crate) store: Arc<FakeRbacStore>,
    pub(crate) audit: Arc<FakeAuditRepository>,
    pub(crate) recorder: AuditRecorder,
    pub(crate) config: EngineConfig,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub(crate) fn with_config(config: EngineConfig) -> Self {
        let audit = Arc::new(FakeAuditRepository::default());
        Self {
            store: Arc::new(FakeRbacStore::default()),
            recorder: AuditRecorder::new(audit.clone()),
            audit,
            config,
        }
    }
}
