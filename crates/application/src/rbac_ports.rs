mod assignments;
mod audit;
mod cache;
mod principals;
mod roles;

pub use assignments::{AssignRoleInput, RevokeRoleInput, RoleAssignmentRepository};
pub use audit::{AuditLogQuery, AuditRepository};
pub use cache::{PermissionCache, PermissionCacheKey};
pub use principals::{PrincipalRepository, PrincipalSecurityUpdate, PrincipalUpsert};
pub use roles::{CreateRoleInput, RoleRepository};
