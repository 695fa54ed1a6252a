//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod assignment;
mod audit;
mod decision;
mod permission;
mod principal;
mod role;

pub use assignment::RoleAssignment;
pub use audit::{AuditAction, AuditEntry};
pub use decision::{Decision, DecisionMatch, DenyReason};
pub use permission::{Action, Permission, PermissionCheck, PermissionScope, Resource};
pub use principal::{AdminPrincipal, parse_ip_ranges};
pub use role::{
    DEFAULT_MAX_HIERARCHY_DEPTH, Role, RoleGraph, RoleName, SUPER_ADMIN_ROLE_NAME,
};
