use std::sync::Arc;

use praetor_application::{
    AuditRepository, PrincipalRepository, RoleAssignmentRepository, RoleRepository,
};
use praetor_infrastructure::{
    InMemoryAuditRepository, InMemoryRbacRepository, PostgresAuditRepository,
    PostgresPrincipalRepository, PostgresRoleAssignmentRepository, PostgresRoleRepository,
};
use sqlx::PgPool;

/// Storage adapters behind the engine's ports.
#[derive(Clone)]
pub struct RepositorySet {
    pub role_repository: Arc<dyn RoleRepository>,
    pub principal_repository: Arc<dyn PrincipalRepository>,
    pub assignment_repository: Arc<dyn RoleAssignmentRepository>,
    pub audit_repository: Arc<dyn AuditRepository>,
}

impl RepositorySet {
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            role_repository: Arc::new(PostgresRoleRepository::new(pool.clone())),
            principal_repository: Arc::new(PostgresPrincipalRepository::new(pool.clone())),
            assignment_repository: Arc::new(PostgresRoleAssignmentRepository::new(pool.clone())),
            audit_repository: Arc::new(PostgresAuditRepository::new(pool.clone())),
        }
    }

    /// One shared in-memory store serves all three rbac ports.
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryRbacRepository::new());

        Self {
            role_repository: store.clone(),
            principal_repository: store.clone(),
            assignment_repository: store,
            audit_repository: Arc::new(InMemoryAuditRepository::new()),
        }
    }
}
