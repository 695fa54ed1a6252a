use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use praetor_core::{AppError, AuditEntryId, PrincipalId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable audit actions emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when a role is created.
    RoleCreated,
    /// Emitted when a role's permissions change.
    RoleUpdated,
    /// Emitted when a role is soft-deleted.
    RoleDeleted,
    /// Emitted when a role's parent changes.
    RoleParentChanged,
    /// Emitted when a role is granted to a principal.
    RoleAssigned,
    /// Emitted on every revoke request, whether or not a grant existed.
    RoleRevoked,
    /// Emitted when identity-provider claims are applied to a principal.
    PrincipalSynced,
    /// Emitted when a principal is deactivated.
    PrincipalDeactivated,
    /// Emitted when a principal is reactivated.
    PrincipalActivated,
    /// Emitted when a principal's mfa flag or ip allow-list changes.
    PrincipalSecurityUpdated,
    /// Emitted when a verification check denies access.
    AccessDenied,
    /// Emitted when a verification check allows access, if enabled.
    AccessGranted,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleCreated => "role_created",
            Self::RoleUpdated => "role_updated",
            Self::RoleDeleted => "role_deleted",
            Self::RoleParentChanged => "role_parent_changed",
            Self::RoleAssigned => "role_assigned",
            Self::RoleRevoked => "role_revoked",
            Self::PrincipalSynced => "principal_synced",
            Self::PrincipalDeactivated => "principal_deactivated",
            Self::PrincipalActivated => "principal_activated",
            Self::PrincipalSecurityUpdated => "principal_security_updated",
            Self::AccessDenied => "access_denied",
            Self::AccessGranted => "access_granted",
        }
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "role_created" => Ok(Self::RoleCreated),
            "role_updated" => Ok(Self::RoleUpdated),
            "role_deleted" => Ok(Self::RoleDeleted),
            "role_parent_changed" => Ok(Self::RoleParentChanged),
            "role_assigned" => Ok(Self::RoleAssigned),
            "role_revoked" => Ok(Self::RoleRevoked),
            "principal_synced" => Ok(Self::PrincipalSynced),
            "principal_deactivated" => Ok(Self::PrincipalDeactivated),
            "principal_activated" => Ok(Self::PrincipalActivated),
            "principal_security_updated" => Ok(Self::PrincipalSecurityUpdated),
            "access_denied" => Ok(Self::AccessDenied),
            "access_granted" => Ok(Self::AccessGranted),
            _ => Err(AppError::Validation(format!(
                "unknown audit action value '{value}'"
            ))),
        }
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Stable entry identifier.
    pub id: AuditEntryId,
    /// Principal who performed the action, or whose access was checked.
    pub actor_id: PrincipalId,
    /// What happened.
    pub action: AuditAction,
    /// Kind of target, e.g. `role` or `role_assignment`.
    pub target_type: String,
    /// Target identifier.
    pub target_id: String,
    /// Tenant context of the action, if any.
    pub tenant_id: Option<TenantId>,
    /// Structured details.
    pub details: Value,
    /// Caller address, if known.
    pub ip_address: Option<IpAddr>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Creates an entry stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        actor_id: PrincipalId,
        action: AuditAction,
        target_type: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            actor_id,
            action,
            target_type: target_type.into(),
            target_id: target_id.into(),
            tenant_id: None,
            details: Value::Null,
            ip_address: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the tenant context.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: Option<TenantId>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    /// Sets structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Sets the caller address.
    #[must_use]
    pub fn with_ip_address(mut self, ip_address: Option<IpAddr>) -> Self {
        self.ip_address = ip_address;
        self
    }
}
