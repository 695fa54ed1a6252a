//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_audit_repository;
mod in_memory_permission_cache;
mod in_memory_rbac_repository;
mod postgres_audit_repository;
mod postgres_principal_repository;
mod postgres_rbac_support;
mod postgres_role_assignment_repository;
mod postgres_role_repository;
mod redis_permission_cache;

pub use in_memory_audit_repository::InMemoryAuditRepository;
pub use in_memory_permission_cache::InMemoryPermissionCache;
pub use in_memory_rbac_repository::InMemoryRbacRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_principal_repository::PostgresPrincipalRepository;
pub use postgres_role_assignment_repository::PostgresRoleAssignmentRepository;
pub use postgres_role_repository::PostgresRoleRepository;
pub use redis_permission_cache::RedisPermissionCache;
