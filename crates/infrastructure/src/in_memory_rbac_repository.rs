use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use tokio::sync::RwLock;

use praetor_application::{
    PrincipalRepository, PrincipalUpsert, RoleAssignmentRepository, RoleRepository,
};
use praetor_core::{AppError, AppResult, PrincipalId, RoleId, TenantId};
use praetor_domain::{AdminPrincipal, Permission, Role, RoleAssignment, RoleGraph};

type GrantKey = (PrincipalId, RoleId, Option<TenantId>);

#[derive(Debug, Default)]
struct RbacState {
    roles: HashMap<RoleId, Role>,
    principals: HashMap<PrincipalId, AdminPrincipal>,
    assignments: HashMap<GrantKey, RoleAssignment>,
}

impl RbacState {
    fn live_roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values().filter(|role| !role.is_deleted())
    }

    fn live_role(&self, role_id: RoleId) -> AppResult<&Role> {
        self.roles
            .get(&role_id)
            .filter(|role| !role.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))
    }

    fn checked_role(&self, role_id: RoleId, expected_version: i64) -> AppResult<Role> {
        let role = self.live_role(role_id)?;
        if role.version != expected_version {
            return Err(AppError::Conflict(format!(
                "role '{role_id}' was modified concurrently or no longer exists"
            )));
        }

        Ok(role.clone())
    }

    fn principal_mut(&mut self, principal_id: PrincipalId) -> AppResult<&mut AdminPrincipal> {
        self.principals
            .get_mut(&principal_id)
            .ok_or_else(|| AppError::NotFound(format!("principal '{principal_id}' was not found")))
    }

    fn bump_holders(&mut self, role_ids: &[RoleId]) -> usize {
        let holders = self
            .assignments
            .keys()
            .filter(|(_, role_id, _)| role_ids.contains(role_id))
            .map(|(principal_id, _, _)| *principal_id)
            .collect::<BTreeSet<_>>();

        for principal_id in &holders {
            if let Some(principal) = self.principals.get_mut(principal_id) {
                principal.assignment_version += 1;
            }
        }

        holders.len()
    }

    fn has_global_grant(&self, role_id: RoleId) -> bool {
        self.assignments
            .keys()
            .any(|(_, assigned, tenant_id)| *assigned == role_id && tenant_id.is_none())
    }

    /// Validates `candidate` against the live hierarchy before it replaces the
    /// stored role, then bumps every principal whose resolution may change.
    fn commit_role_edit(&mut self, candidate: Role, max_depth: usize) -> AppResult<Role> {
        let role_id = candidate.id;
        let graph = RoleGraph::new(
            self.live_roles()
                .filter(|role| role.id != role_id)
                .cloned()
                .chain(std::iter::once(candidate.clone())),
            max_depth,
        );
        graph.revalidate_chain(role_id)?;

        let mut affected = graph.descendants(role_id);
        affected.push(role_id);
        graph.ensure_global_grants_allowed(affected.iter().copied(), |affected_id| {
            self.has_global_grant(affected_id)
        })?;
        self.roles.insert(role_id, candidate.clone());
        self.bump_holders(&affected);

        Ok(candidate)
    }
}

/// In-memory rbac store implementing the role, assignment and principal ports.
///
/// One lock guards all three collections so hierarchy edits and version bumps
/// are applied atomically.
#[derive(Debug, Default)]
pub struct InMemoryRbacRepository {
    state: RwLock<RbacState>,
}

impl InMemoryRbacRepository {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleRepository for InMemoryRbacRepository {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let state = self.state.read().await;
        let mut roles = state.live_roles().cloned().collect::<Vec<_>>();
        roles.sort_by(|left, right| left.name.cmp(&right.name));

        Ok(roles)
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.state.read().await.live_role(role_id).ok().cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        Ok(self
            .state
            .read()
            .await
            .live_roles()
            .find(|role| role.name.as_str() == name)
            .cloned())
    }

    async fn insert_role(&self, role: Role) -> AppResult<Role> {
        let mut state = self.state.write().await;
        if state.live_roles().any(|existing| existing.name == role.name) {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.name
            )));
        }

        if let Some(parent_role_id) = role.parent_role_id {
            state.live_role(parent_role_id)?;
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
        let mut state = self.state.write().await;
        if let Some(parent_role_id) = parent_role_id {
            state.live_role(parent_role_id).map_err(|_| {
                AppError::NotFound(format!("parent role '{parent_role_id}' was not found"))
            })?;
        }

        let mut candidate = state.checked_role(role_id, expected_version)?;
        candidate.parent_role_id = parent_role_id;
        candidate.version += 1;

        state.commit_role_edit(candidate, max_depth)
    }

    async fn update_permissions(
        &self,
        role_id: RoleId,
        permissions: BTreeSet<Permission>,
        expected_version: i64,
        max_depth: usize,
    ) -> AppResult<Role> {
        let mut state = self.state.write().await;
        let mut candidate = state.checked_role(role_id, expected_version)?;
        candidate.permissions = permissions;
        candidate.version += 1;

        state.commit_role_edit(candidate, max_depth)
    }

    async fn soft_delete_role(
        &self,
        role_id: RoleId,
        expected_version: i64,
        max_depth: usize,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.checked_role(role_id, expected_version)?;

        let graph = RoleGraph::new(state.live_roles().cloned(), max_depth);
        let mut affected = graph.descendants(role_id);
        let remaining = RoleGraph::new(
            state
                .live_roles()
                .filter(|role| role.id != role_id)
                .cloned()
                .map(|mut role| {
                    if role.parent_role_id == Some(role_id) {
                        role.parent_role_id = None;
                    }
                    role
                }),
            max_depth,
        );
        remaining.ensure_global_grants_allowed(affected.iter().copied(), |affected_id| {
            state.has_global_grant(affected_id)
        })?;
        affected.push(role_id);

        let deleted_at = Utc::now();
        for role in state.roles.values_mut() {
            if role.id == role_id {
                role.deleted_at = Some(deleted_at);
                role.version += 1;
            } else if role.parent_role_id == Some(role_id) && !role.is_deleted() {
                role.parent_role_id = None;
                role.version += 1;
            }
        }
        let bumped = state.bump_holders(&affected);

        tracing::info!(role_id = %role_id, principals = bumped, "soft-deleted role");
        Ok(())
    }
}

#[async_trait]
impl RoleAssignmentRepository for InMemoryRbacRepository {
    async fn insert_assignment(&self, assignment: RoleAssignment) -> AppResult<RoleAssignment> {
        let mut state = self.state.write().await;
        let key = (
            assignment.principal_id,
            assignment.role_id,
            assignment.tenant_id,
        );
        if state.assignments.contains_key(&key) {
            return Err(AppError::DuplicateAssignment {
                principal_id: assignment.principal_id,
                role_id: assignment.role_id,
                tenant_id: assignment.tenant_id,
            });
        }

        if !state.roles.contains_key(&assignment.role_id) {
            return Err(AppError::NotFound(format!(
                "role '{}' was not found",
                assignment.role_id
            )));
        }

        state.principal_mut(assignment.principal_id)?.assignment_version += 1;
        state.assignments.insert(key, assignment.clone());

        Ok(assignment)
    }

    async fn delete_assignment(
        &self,
        principal_id: PrincipalId,
        role_id: RoleId,
        tenant_id: Option<TenantId>,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let deleted = state
            .assignments
            .remove(&(principal_id, role_id, tenant_id))
            .is_some();

        if deleted {
            state.principal_mut(principal_id)?.assignment_version += 1;
        }

        Ok(deleted)
    }

    async fn list_assignments_for_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let state = self.state.read().await;
        let mut assignments = state
            .assignments
            .values()
            .filter(|assignment| assignment.principal_id == principal_id)
            .cloned()
            .collect::<Vec<_>>();
        assignments.sort_by_key(|assignment| (assignment.granted_at, assignment.id));

        Ok(assignments)
    }

    async fn list_applicable_assignments(
        &self,
        principal_id: PrincipalId,
        tenant_context: Option<TenantId>,
        as_of: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>> {
        let state = self.state.read().await;
        let mut assignments = state
            .assignments
            .values()
            .filter(|assignment| {
                assignment.principal_id == principal_id
                    && assignment.applies_to(tenant_context)
                    && assignment.is_active_at(as_of)
            })
            .cloned()
            .collect::<Vec<_>>();
        assignments.sort_by_key(|assignment| (assignment.granted_at, assignment.id));

        Ok(assignments)
    }
}

#[async_trait]
impl PrincipalRepository for InMemoryRbacRepository {
    async fn find_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Option<AdminPrincipal>> {
        Ok(self.state.read().await.principals.get(&principal_id).cloned())
    }

    async fn find_principal_by_external_ref(
        &self,
        external_ref: &str,
    ) -> AppResult<Option<AdminPrincipal>> {
        Ok(self
            .state
            .read()
            .await
            .principals
            .values()
            .find(|principal| principal.external_identity_ref == external_ref)
            .cloned())
    }

    async fn upsert_principal(&self, upsert: PrincipalUpsert) -> AppResult<AdminPrincipal> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .principals
            .values_mut()
            .find(|principal| principal.external_identity_ref == upsert.external_ref)
        {
            existing.email = upsert.email;
            existing.is_super_admin = upsert.is_super_admin;
            existing.last_login_at = Some(upsert.login_at);
            return Ok(existing.clone());
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
        let mut state = self.state.write().await;
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
        let mut state = self.state.write().await;
        let principal = state.principal_mut(principal_id)?;
        principal.require_mfa = require_mfa;
        principal.allowed_ip_ranges = allowed_ip_ranges;
        principal.assignment_version += 1;

        Ok(principal.clone())
    }
}

#[cfg(test)]
mod tests;
