use async_trait::async_trait;
use chrono::{DateTime, Utc};

use praetor_core::{AppResult, PrincipalId, RoleId, TenantId};
use praetor_domain::RoleAssignment;

/// Input payload for granting a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignRoleInput {
    /// Grantee.
    pub principal_id: PrincipalId,
    /// Granted role.
    pub role_id: RoleId,
    /// Tenant restriction; `None` grants globally.
    pub tenant_id: Option<TenantId>,
    /// Issuer of the grant.
    pub granted_by_id: PrincipalId,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Input payload for revoking a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeRoleInput {
    /// Grantee.
    pub principal_id: PrincipalId,
    /// Revoked role.
    pub role_id: RoleId,
    /// Tenant restriction of the grant being revoked.
    pub tenant_id: Option<TenantId>,
    /// Principal performing the revoke.
    pub revoked_by_id: PrincipalId,
}

/// Repository port for role assignments.
#[async_trait]
pub trait RoleAssignmentRepository: Send + Sync {
    /// Inserts an assignment against the `(principal, role, tenant)` unique
    /// constraint, translating a violation into `DuplicateAssignment`, and
    /// bumps the principal's assignment version in the same transaction.
    async fn insert_assignment(&self, assignment: RoleAssignment) -> AppResult<RoleAssignment>;

    /// Deletes the matching assignment if present and bumps the principal's
    /// assignment version. Returns whether a row was deleted.
    async fn delete_assignment(
        &self,
        principal_id: PrincipalId,
        role_id: RoleId,
        tenant_id: Option<TenantId>,
    ) -> AppResult<bool>;

    /// Lists every assignment of a principal, expired ones included.
    async fn list_assignments_for_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<RoleAssignment>>;

    /// Lists assignments that apply to a resolution: global grants plus grants
    /// for `tenant_context`, excluding those expired at `as_of`.
    async fn list_applicable_assignments(
        &self,
        principal_id: PrincipalId,
        tenant_context: Option<TenantId>,
        as_of: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>>;
}
