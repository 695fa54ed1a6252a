use chrono::{DateTime, Utc};
use praetor_core::{AssignmentId, PrincipalId, RoleId, TenantId};
use serde::{Deserialize, Serialize};

/// Grant of a role to a principal, optionally tenant-scoped and time-limited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Stable assignment identifier.
    pub id: AssignmentId,
    /// Grantee.
    pub principal_id: PrincipalId,
    /// Granted role.
    pub role_id: RoleId,
    /// Tenant the grant is restricted to; `None` is a global grant.
    pub tenant_id: Option<TenantId>,
    /// Principal who issued the grant.
    pub granted_by_id: PrincipalId,
    /// Grant timestamp.
    pub granted_at: DateTime<Utc>,
    /// Optional expiry; the grant is inactive from this instant on.
    pub expires_at: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    /// Returns whether the assignment is in force at `as_of`.
    #[must_use]
    pub fn is_active_at(&self, as_of: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > as_of)
    }

    /// Returns whether the assignment applies to a resolution in `tenant_context`.
    #[must_use]
    pub fn applies_to(&self, tenant_context: Option<TenantId>) -> bool {
        match self.tenant_id {
            None => true,
            Some(tenant_id) => tenant_context == Some(tenant_id),
        }
    }
}
