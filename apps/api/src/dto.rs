use std::str::FromStr;

use chrono::{DateTime, Utc};
use praetor_application::AssignedRole;
use praetor_core::{AppError, AppResult, PrincipalId, RoleId, TenantId};
use praetor_domain::{AdminPrincipal, AuditEntry, DecisionMatch, Role, RoleAssignment};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Health response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Identity-provider claims forwarded on login.
#[derive(Debug, Deserialize)]
pub struct SyncPrincipalRequest {
    pub external_ref: String,
    pub email: Option<String>,
    #[serde(default)]
    pub is_super_admin: bool,
    pub org_id: Option<Uuid>,
    pub org_role: Option<String>,
}

/// Partial update of a principal's mfa flag and ip allow-list.
#[derive(Debug, Deserialize)]
pub struct UpdatePrincipalSecurityRequest {
    pub require_mfa: Option<bool>,
    pub allowed_ip_ranges: Option<Vec<String>>,
}

/// API representation of an administrative principal.
#[derive(Debug, Serialize)]
pub struct PrincipalResponse {
    pub principal_id: String,
    pub external_identity_ref: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub is_super_admin: bool,
    pub require_mfa: bool,
    pub allowed_ip_ranges: Vec<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub assignment_version: i64,
}

impl From<AdminPrincipal> for PrincipalResponse {
    fn from(principal: AdminPrincipal) -> Self {
        Self {
            principal_id: principal.id.to_string(),
            external_identity_ref: principal.external_identity_ref,
            email: principal.email,
            is_active: principal.is_active,
            is_super_admin: principal.is_super_admin,
            require_mfa: principal.require_mfa,
            allowed_ip_ranges: principal
                .allowed_ip_ranges
                .iter()
                .map(ToString::to_string)
                .collect(),
            last_login_at: principal.last_login_at,
            assignment_version: principal.assignment_version,
        }
    }
}

/// Incoming payload for role creation.
#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parent_role_id: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Incoming payload for re-parenting a role; `null` detaches it.
#[derive(Debug, Deserialize)]
pub struct SetRoleParentRequest {
    pub parent_role_id: Option<String>,
}

/// Incoming payload replacing a role's direct permissions.
#[derive(Debug, Deserialize)]
pub struct SetRolePermissionsRequest {
    pub permissions: Vec<String>,
}

/// API representation of a role.
#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub role_id: String,
    pub name: String,
    pub description: String,
    pub is_system: bool,
    pub parent_role_id: Option<String>,
    pub permissions: Vec<String>,
    pub version: i64,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        Self {
            role_id: role.id.to_string(),
            name: role.name.as_str().to_owned(),
            description: role.description,
            is_system: role.is_system_role,
            parent_role_id: role.parent_role_id.map(|parent_id| parent_id.to_string()),
            permissions: role.permissions.iter().map(ToString::to_string).collect(),
            version: role.version,
        }
    }
}

/// Incoming payload for granting a role.
#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub principal_id: String,
    pub role_id: String,
    pub tenant_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Incoming payload for revoking a role.
#[derive(Debug, Deserialize)]
pub struct RevokeRoleRequest {
    pub principal_id: String,
    pub role_id: String,
    pub tenant_id: Option<String>,
}

/// Result of a revoke request.
#[derive(Debug, Serialize)]
pub struct RevokeRoleResponse {
    pub revoked: bool,
}

/// API representation of a stored assignment.
#[derive(Debug, Serialize)]
pub struct RoleAssignmentResponse {
    pub assignment_id: String,
    pub principal_id: String,
    pub role_id: String,
    pub tenant_id: Option<String>,
    pub granted_by_id: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<RoleAssignment> for RoleAssignmentResponse {
    fn from(assignment: RoleAssignment) -> Self {
        Self {
            assignment_id: assignment.id.to_string(),
            principal_id: assignment.principal_id.to_string(),
            role_id: assignment.role_id.to_string(),
            tenant_id: assignment.tenant_id.map(|tenant_id| tenant_id.to_string()),
            granted_by_id: assignment.granted_by_id.to_string(),
            granted_at: assignment.granted_at,
            expires_at: assignment.expires_at,
        }
    }
}

/// Optional tenant filter for assignment listings.
#[derive(Debug, Deserialize)]
pub struct AssignmentListQuery {
    pub tenant_id: Option<String>,
}

/// API representation of a role held by a principal.
#[derive(Debug, Serialize)]
pub struct AssignedRoleResponse {
    pub assignment_id: String,
    pub role: RoleResponse,
    pub tenant_id: Option<String>,
    pub granted_by_id: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<AssignedRole> for AssignedRoleResponse {
    fn from(assigned: AssignedRole) -> Self {
        Self {
            assignment_id: assigned.assignment_id.to_string(),
            role: RoleResponse::from(assigned.role),
            tenant_id: assigned.tenant_id.map(|tenant_id| tenant_id.to_string()),
            granted_by_id: assigned.granted_by_id.to_string(),
            expires_at: assigned.expires_at,
        }
    }
}

/// Incoming payload for a permission check.
#[derive(Debug, Deserialize)]
pub struct PermissionCheckRequest {
    pub principal_id: String,
    pub resource: String,
    pub action: String,
    pub scope: String,
    pub tenant_id: Option<String>,
    pub client_ip: Option<String>,
}

/// Incoming payload for a role check.
#[derive(Debug, Deserialize)]
pub struct RoleCheckRequest {
    pub principal_id: String,
    pub role_name: String,
    #[serde(default)]
    pub include_ancestors: bool,
    pub tenant_id: Option<String>,
    pub client_ip: Option<String>,
}

/// Successful access decision.
#[derive(Debug, Serialize)]
pub struct AccessDecisionResponse {
    pub allowed: bool,
    pub matched: DecisionMatch,
}

/// Audit log filter and paging parameters.
#[derive(Debug, Deserialize)]
pub struct AuditLogQueryRequest {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub action: Option<String>,
    pub actor_id: Option<String>,
    pub tenant_id: Option<String>,
}

/// API representation of an audit entry.
#[derive(Debug, Serialize)]
pub struct AuditEntryResponse {
    pub entry_id: String,
    pub actor_id: String,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub tenant_id: Option<String>,
    pub details: Value,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditEntry> for AuditEntryResponse {
    fn from(entry: AuditEntry) -> Self {
        Self {
            entry_id: entry.id.to_string(),
            actor_id: entry.actor_id.to_string(),
            action: entry.action.as_str().to_owned(),
            target_type: entry.target_type,
            target_id: entry.target_id,
            tenant_id: entry.tenant_id.map(|tenant_id| tenant_id.to_string()),
            details: entry.details,
            ip_address: entry.ip_address.map(|ip_address| ip_address.to_string()),
            created_at: entry.created_at,
        }
    }
}

pub fn parse_principal_id(value: &str) -> AppResult<PrincipalId> {
    PrincipalId::from_str(value.trim())
        .map_err(|_| AppError::Validation(format!("invalid principal id '{value}'")))
}

pub fn parse_role_id(value: &str) -> AppResult<RoleId> {
    RoleId::from_str(value.trim())
        .map_err(|_| AppError::Validation(format!("invalid role id '{value}'")))
}

pub fn parse_tenant_id(value: Option<&str>) -> AppResult<Option<TenantId>> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            TenantId::from_str(value)
                .map_err(|_| AppError::Validation(format!("invalid tenant id '{value}'")))
        })
        .transpose()
}
