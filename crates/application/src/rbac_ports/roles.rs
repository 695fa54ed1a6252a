use std::collections::BTreeSet;

use async_trait::async_trait;

use praetor_core::{AppResult, RoleId};
use praetor_domain::{Permission, Role};

/// Input payload for creating custom roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleInput {
    /// Unique role name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Optional parent in the hierarchy.
    pub parent_role_id: Option<RoleId>,
    /// Catalog permissions attached directly to the role.
    pub permissions: Vec<Permission>,
}

/// Repository port for roles and hierarchy edges.
///
/// Reads only ever return live roles; soft-deleted roles are invisible.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Lists every live role.
    async fn list_roles(&self) -> AppResult<Vec<Role>>;

    /// Finds a live role by id.
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Finds a live role by its unique name.
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>>;

    /// Inserts a role; a name collision surfaces as `Conflict`.
    async fn insert_role(&self, role: Role) -> AppResult<Role>;

    /// Changes a role's parent inside one transaction.
    ///
    /// Implementations re-validate the hierarchy after the write and roll back
    /// with `CyclicHierarchy`/`Validation` on violation, bump the role
    /// version (`Conflict` when `expected_version` is stale), and bump the
    /// assignment version of every principal holding the role or one of its
    /// descendants.
    async fn update_parent(
        &self,
        role_id: RoleId,
        parent_role_id: Option<RoleId>,
        expected_version: i64,
        max_depth: usize,
    ) -> AppResult<Role>;

    /// Replaces a role's direct permissions, with the same version semantics
    /// as [`RoleRepository::update_parent`].
    async fn update_permissions(
        &self,
        role_id: RoleId,
        permissions: BTreeSet<Permission>,
        expected_version: i64,
        max_depth: usize,
    ) -> AppResult<Role>;

    /// Soft-deletes a role, detaching its children and bumping the assignment
    /// version of affected principals.
    async fn soft_delete_role(
        &self,
        role_id: RoleId,
        expected_version: i64,
        max_depth: usize,
    ) -> AppResult<()>;
}
