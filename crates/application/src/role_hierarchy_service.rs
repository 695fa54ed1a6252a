use std::collections::BTreeSet;
use std::sync::Arc;

use praetor_core::{AppError, AppResult, PrincipalId, RoleId};
use praetor_domain::{
    AuditAction, AuditEntry, Permission, Role, RoleGraph, RoleName, SUPER_ADMIN_ROLE_NAME,
};
use serde_json::json;

use crate::{AuditRecorder, CreateRoleInput, EngineConfig, RoleRepository};

/// Loads a fresh hierarchy snapshot from the role store.
pub(crate) async fn load_role_graph(
    repository: &dyn RoleRepository,
    max_depth: usize,
) -> AppResult<RoleGraph> {
    Ok(RoleGraph::new(repository.list_roles().await?, max_depth))
}

/// Application service for roles and the role hierarchy.
#[derive(Clone)]
pub struct RoleHierarchyService {
    repository: Arc<dyn RoleRepository>,
    audit_recorder: AuditRecorder,
    config: EngineConfig,
}

impl RoleHierarchyService {
    /// Creates a new role hierarchy service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RoleRepository>,
        audit_recorder: AuditRecorder,
        config: EngineConfig,
    ) -> Self {
        Self {
            repository,
            audit_recorder,
            config,
        }
    }

    /// Creates a custom role, optionally below an existing parent.
    pub async fn create_role(&self, actor_id: PrincipalId, input: CreateRoleInput) -> AppResult<Role> {
        let role = Role {
            id: RoleId::new(),
            name: RoleName::new(input.name)?,
            description: input.description.trim().to_owned(),
            is_system_role: false,
            parent_role_id: input.parent_role_id,
            permissions: input.permissions.into_iter().collect(),
            version: 1,
            deleted_at: None,
        };

        if role.parent_role_id.is_some() {
            let mut roles = self.repository.list_roles().await?;
            roles.push(Role {
                parent_role_id: None,
                ..role.clone()
            });
            RoleGraph::new(roles, self.config.max_hierarchy_depth)
                .validate_parent(role.id, role.parent_role_id)?;
        }

        let created = self.repository.insert_role(role).await?;

        self.audit_recorder
            .record(
                AuditEntry::new(actor_id, AuditAction::RoleCreated, "role", created.id.to_string())
                    .with_details(json!({
                        "name": created.name.as_str(),
                        "parent_role_id": created.parent_role_id,
                        "permissions": permission_ids(&created.permissions),
                    })),
            )
            .await;

        Ok(created)
    }

    /// Returns a live role by id.
    pub async fn get_role(&self, role_id: RoleId) -> AppResult<Role> {
        self.repository
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))
    }

    /// Returns a live role by name.
    pub async fn get_role_by_name(&self, name: &str) -> AppResult<Role> {
        self.repository
            .find_role_by_name(name.trim())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{}' was not found", name.trim())))
    }

    /// Lists live roles ordered by name.
    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let mut roles = self.repository.list_roles().await?;
        roles.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(roles)
    }

    /// Moves a role below a new parent, or detaches it with `None`.
    ///
    /// The edit is validated against a fresh snapshot and then re-validated by
    /// the repository inside the write transaction.
    pub async fn set_parent(
        &self,
        actor_id: PrincipalId,
        role_id: RoleId,
        parent_role_id: Option<RoleId>,
    ) -> AppResult<Role> {
        let graph = self.load_graph().await?;
        let role = graph
            .role(role_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))?;
        role.ensure_mutable()?;
        graph.validate_parent(role_id, parent_role_id)?;

        if role.parent_role_id == parent_role_id {
            return Ok(role);
        }

        let updated = self
            .repository
            .update_parent(
                role_id,
                parent_role_id,
                role.version,
                self.config.max_hierarchy_depth,
            )
            .await?;

        self.audit_recorder
            .record(
                AuditEntry::new(
                    actor_id,
                    AuditAction::RoleParentChanged,
                    "role",
                    role_id.to_string(),
                )
                .with_details(json!({
                    "name": updated.name.as_str(),
                    "previous_parent_role_id": role.parent_role_id,
                    "parent_role_id": updated.parent_role_id,
                })),
            )
            .await;

        Ok(updated)
    }

    /// Returns the ancestors of a role, nearest parent first.
    pub async fn ancestors(&self, role_id: RoleId) -> AppResult<Vec<Role>> {
        let graph = self.load_graph().await?;
        Ok(graph.ancestors(role_id)?.into_iter().cloned().collect())
    }

    /// Returns whether `candidate_id` is a strict ancestor of `of_id`.
    pub async fn is_ancestor(&self, candidate_id: RoleId, of_id: RoleId) -> AppResult<bool> {
        self.load_graph().await?.is_ancestor(candidate_id, of_id)
    }

    /// Returns the permissions a role grants, inherited ones included.
    pub async fn effective_permissions(&self, role_id: RoleId) -> AppResult<BTreeSet<Permission>> {
        self.load_graph().await?.effective_permissions(role_id)
    }

    /// Replaces the direct permissions of a custom role.
    pub async fn set_role_permissions(
        &self,
        actor_id: PrincipalId,
        role_id: RoleId,
        permissions: Vec<Permission>,
    ) -> AppResult<Role> {
        let role = self.get_role(role_id).await?;
        role.ensure_mutable()?;

        let permissions = permissions.into_iter().collect::<BTreeSet<_>>();
        let updated = self
            .repository
            .update_permissions(
                role_id,
                permissions,
                role.version,
                self.config.max_hierarchy_depth,
            )
            .await?;

        self.audit_recorder
            .record(
                AuditEntry::new(actor_id, AuditAction::RoleUpdated, "role", role_id.to_string())
                    .with_details(json!({
                        "name": updated.name.as_str(),
                        "previous_permissions": permission_ids(&role.permissions),
                        "permissions": permission_ids(&updated.permissions),
                    })),
            )
            .await;

        Ok(updated)
    }

    /// Soft-deletes a custom role; its children are detached.
    pub async fn delete_role(&self, actor_id: PrincipalId, role_id: RoleId) -> AppResult<()> {
        let role = self.get_role(role_id).await?;
        role.ensure_mutable()?;

        self.repository
            .soft_delete_role(role_id, role.version, self.config.max_hierarchy_depth)
            .await?;

        self.audit_recorder
            .record(
                AuditEntry::new(actor_id, AuditAction::RoleDeleted, "role", role_id.to_string())
                    .with_details(json!({ "name": role.name.as_str() })),
            )
            .await;

        Ok(())
    }

    /// Ensures the `super_admin` system role exists and holds the whole catalog.
    pub async fn seed_system_roles(&self) -> AppResult<Role> {
        let catalog = Permission::catalog().iter().copied().collect::<BTreeSet<_>>();

        let existing = match self.repository.find_role_by_name(SUPER_ADMIN_ROLE_NAME).await? {
            Some(role) => role,
            None => {
                let seeded = Role {
                    id: RoleId::new(),
                    name: RoleName::new(SUPER_ADMIN_ROLE_NAME)?,
                    description: "Unrestricted platform administration".to_owned(),
                    is_system_role: true,
                    parent_role_id: None,
                    permissions: catalog.clone(),
                    version: 1,
                    deleted_at: None,
                };

                match self.repository.insert_role(seeded).await {
                    Ok(role) => {
                        tracing::info!(role_id = %role.id, "seeded super_admin system role");
                        return Ok(role);
                    }
                    Err(AppError::Conflict(_)) => self.get_role_by_name(SUPER_ADMIN_ROLE_NAME).await?,
                    Err(error) => return Err(error),
                }
            }
        };

        if !existing.is_system_role {
            return Err(AppError::Conflict(format!(
                "role '{SUPER_ADMIN_ROLE_NAME}' exists but is not a system role"
            )));
        }

        if existing.permissions == catalog {
            return Ok(existing);
        }

        tracing::info!(role_id = %existing.id, "refreshing super_admin permissions");
        self.repository
            .update_permissions(
                existing.id,
                catalog,
                existing.version,
                self.config.max_hierarchy_depth,
            )
            .await
    }

    async fn load_graph(&self) -> AppResult<RoleGraph> {
        load_role_graph(self.repository.as_ref(), self.config.max_hierarchy_depth).await
    }
}

fn permission_ids(permissions: &BTreeSet<Permission>) -> Vec<String> {
    permissions.iter().map(Permission::id).collect()
}

#[cfg(test)]
mod tests;
