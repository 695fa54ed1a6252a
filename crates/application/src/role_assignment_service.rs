use std::sync::Arc;

use chrono::{DateTime, Utc};
use praetor_core::{AppError, AppResult, AssignmentId, PrincipalId, TenantId};
use praetor_domain::{AuditAction, AuditEntry, Role, RoleAssignment};
use serde_json::json;

use crate::role_hierarchy_service::load_role_graph;
use crate::{
    AssignRoleInput, AuditRecorder, EngineConfig, PrincipalRepository, RevokeRoleInput,
    RoleAssignmentRepository, RoleRepository,
};

/// A live role held by a principal through one assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedRole {
    /// Held role.
    pub role: Role,
    /// Tenant the assignment is scoped to.
    pub tenant_id: Option<TenantId>,
    /// Assignment identifier.
    pub assignment_id: AssignmentId,
    /// Issuer of the grant.
    pub granted_by_id: PrincipalId,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Application service granting and revoking roles.
#[derive(Clone)]
pub struct RoleAssignmentService {
    assignment_repository: Arc<dyn RoleAssignmentRepository>,
    role_repository: Arc<dyn RoleRepository>,
    principal_repository: Arc<dyn PrincipalRepository>,
    audit_recorder: AuditRecorder,
    config: EngineConfig,
}

impl RoleAssignmentService {
    /// Creates a new role assignment service.
    #[must_use]
    pub fn new(
        assignment_repository: Arc<dyn RoleAssignmentRepository>,
        role_repository: Arc<dyn RoleRepository>,
        principal_repository: Arc<dyn PrincipalRepository>,
        audit_recorder: AuditRecorder,
        config: EngineConfig,
    ) -> Self {
        Self {
            assignment_repository,
            role_repository,
            principal_repository,
            audit_recorder,
            config,
        }
    }

    /// Grants a role to a principal.
    ///
    /// A role whose reachable permissions are all tenant-bound needs a
    /// tenant. Uniqueness is left to the store; a second identical grant fails
    /// with `DuplicateAssignment`.
    pub async fn assign_role(&self, input: AssignRoleInput) -> AppResult<RoleAssignment> {
        let graph = load_role_graph(
            self.role_repository.as_ref(),
            self.config.max_hierarchy_depth,
        )
        .await?;
        let role = graph.role(input.role_id).ok_or_else(|| {
            AppError::NotFound(format!("role '{}' was not found", input.role_id))
        })?;

        if self
            .principal_repository
            .find_principal(input.principal_id)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound(format!(
                "principal '{}' was not found",
                input.principal_id
            )));
        }

        if input.tenant_id.is_none() && graph.is_tenant_only(role.id)? {
            return Err(AppError::Validation(format!(
                "role '{}' only grants tenant-scoped permissions and requires a tenant",
                role.name
            )));
        }

        let now = Utc::now();
        if input.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return Err(AppError::Validation(
                "expires_at must be in the future".to_owned(),
            ));
        }

        let assignment = self
            .assignment_repository
            .insert_assignment(RoleAssignment {
                id: AssignmentId::new(),
                principal_id: input.principal_id,
                role_id: role.id,
                tenant_id: input.tenant_id,
                granted_by_id: input.granted_by_id,
                granted_at: now,
                expires_at: input.expires_at,
            })
            .await?;

        self.audit_recorder
            .record(
                AuditEntry::new(
                    input.granted_by_id,
                    AuditAction::RoleAssigned,
                    "role_assignment",
                    assignment.id.to_string(),
                )
                .with_tenant(assignment.tenant_id)
                .with_details(json!({
                    "principal_id": assignment.principal_id,
                    "role_id": assignment.role_id,
                    "role_name": role.name.as_str(),
                    "expires_at": assignment.expires_at,
                })),
            )
            .await;

        Ok(assignment)
    }

    /// Revokes a grant if it exists. Returns whether one was removed.
    ///
    /// The revoke request is audited either way.
    pub async fn revoke_role(&self, input: RevokeRoleInput) -> AppResult<bool> {
        let deleted = self
            .assignment_repository
            .delete_assignment(input.principal_id, input.role_id, input.tenant_id)
            .await?;

        self.audit_recorder
            .record(
                AuditEntry::new(
                    input.revoked_by_id,
                    AuditAction::RoleRevoked,
                    "role_assignment",
                    format!("{}:{}", input.principal_id, input.role_id),
                )
                .with_tenant(input.tenant_id)
                .with_details(json!({
                    "principal_id": input.principal_id,
                    "role_id": input.role_id,
                    "deleted": deleted,
                })),
            )
            .await;

        Ok(deleted)
    }

    /// Lists live, unexpired roles held by a principal.
    ///
    /// With a tenant filter only grants scoped to exactly that tenant are
    /// returned; without one every grant is.
    pub async fn list_assignments(
        &self,
        principal_id: PrincipalId,
        tenant_id: Option<TenantId>,
    ) -> AppResult<Vec<AssignedRole>> {
        if self
            .principal_repository
            .find_principal(principal_id)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound(format!(
                "principal '{principal_id}' was not found"
            )));
        }

        let now = Utc::now();
        let graph = load_role_graph(
            self.role_repository.as_ref(),
            self.config.max_hierarchy_depth,
        )
        .await?;
        let mut assigned = self
            .assignment_repository
            .list_assignments_for_principal(principal_id)
            .await?
            .into_iter()
            .filter(|assignment| assignment.is_active_at(now))
            .filter(|assignment| tenant_id.is_none() || assignment.tenant_id == tenant_id)
            .filter_map(|assignment| {
                graph.role(assignment.role_id).map(|role| AssignedRole {
                    role: role.clone(),
                    tenant_id: assignment.tenant_id,
                    assignment_id: assignment.id,
                    granted_by_id: assignment.granted_by_id,
                    expires_at: assignment.expires_at,
                })
            })
            .collect::<Vec<_>>();

        assigned.sort_by(|left, right| {
            (&left.role.name, left.tenant_id).cmp(&(&right.role.name, right.tenant_id))
        });
        Ok(assigned)
    }
}
