//! Application services and ports.

#![forbid(unsafe_code)]

mod access_verifier;
mod audit_recorder;
mod engine_config;
mod permission_resolver;
mod principal_service;
mod rbac_ports;
mod role_assignment_service;
mod role_hierarchy_service;

#[cfg(test)]
mod test_fakes;

pub use access_verifier::{AccessContext, AccessVerifier};
pub use audit_recorder::AuditRecorder;
pub use engine_config::EngineConfig;
pub use permission_resolver::{
    PermissionResolver, ResolvedGrant, ResolvedPermissions, ResolvedRole,
};
pub use principal_service::PrincipalService;
pub use rbac_ports::{
    AssignRoleInput, AuditLogQuery, AuditRepository, CreateRoleInput, PermissionCache,
    PermissionCacheKey, PrincipalRepository, PrincipalSecurityUpdate, PrincipalUpsert,
    RevokeRoleInput, RoleAssignmentRepository, RoleRepository,
};
pub use role_assignment_service::{AssignedRole, RoleAssignmentService};
pub use role_hierarchy_service::RoleHierarchyService;
