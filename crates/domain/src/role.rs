//! Roles and the parent/child hierarchy between them.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use praetor_core::{AppError, AppResult, NonEmptyString, RoleId};
use serde::{Deserialize, Serialize};

use crate::Permission;

/// Name of the system role held by super administrators.
pub const SUPER_ADMIN_ROLE_NAME: &str = "super_admin";

/// Default bound on the length of an ancestor chain.
pub const DEFAULT_MAX_HIERARCHY_DEPTH: usize = 16;

const ROLE_NAME_MAX_LENGTH: usize = 64;

/// Validated unique role name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleName(NonEmptyString);

impl RoleName {
    /// Creates a role name: trimmed, lowercase ascii, digits, `_`, `-` and `.`.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_owned();
        let name = NonEmptyString::new(value)?;

        if name.as_str().len() > ROLE_NAME_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "role name must be at most {ROLE_NAME_MAX_LENGTH} characters"
            )));
        }

        let is_valid = name.as_str().chars().all(|character| {
            character.is_ascii_lowercase()
                || character.is_ascii_digit()
                || matches!(character, '_' | '-' | '.')
        });
        if !is_valid {
            return Err(AppError::Validation(format!(
                "role name '{}' may only contain lowercase letters, digits, '_', '-' and '.'",
                name.as_str()
            )));
        }

        Ok(Self(name))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Role owned by the role store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Stable role identifier.
    pub id: RoleId,
    /// Unique role name.
    pub name: RoleName,
    /// Free-form description for administrators.
    pub description: String,
    /// System roles are immutable and undeletable.
    pub is_system_role: bool,
    /// Parent in the role hierarchy.
    pub parent_role_id: Option<RoleId>,
    /// Permissions attached directly to this role.
    pub permissions: BTreeSet<Permission>,
    /// Optimistic concurrency version, bumped on every edit.
    pub version: i64,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    /// Returns whether the role has been soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Fails when the role is a system role.
    pub fn ensure_mutable(&self) -> AppResult<()> {
        if self.is_system_role {
            return Err(AppError::Validation(format!(
                "system role '{}' cannot be modified",
                self.name
            )));
        }

        Ok(())
    }
}

/// Adjacency snapshot of live roles.
///
/// Rebuilt from the role store for each operation; every traversal is a pure
/// function over the snapshot and is bounded by `max_depth`.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    roles: HashMap<RoleId, Role>,
    max_depth: usize,
}

impl RoleGraph {
    /// Builds a graph from roles, dropping soft-deleted ones.
    #[must_use]
    pub fn new(roles: impl IntoIterator<Item = Role>, max_depth: usize) -> Self {
        Self {
            roles: roles
                .into_iter()
                .filter(|role| !role.is_deleted())
                .map(|role| (role.id, role))
                .collect(),
            max_depth,
        }
    }

    /// Returns the configured depth bound.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns a live role by id.
    #[must_use]
    pub fn role(&self, role_id: RoleId) -> Option<&Role> {
        self.roles.get(&role_id)
    }

    /// Returns a live role by name.
    #[must_use]
    pub fn role_by_name(&self, name: &str) -> Option<&Role> {
        self.roles.values().find(|role| role.name.as_str() == name)
    }

    /// Returns live roles ordered by name.
    #[must_use]
    pub fn roles_by_name(&self) -> Vec<&Role> {
        let mut roles = self.roles.values().collect::<Vec<_>>();
        roles.sort_by(|left, right| left.name.cmp(&right.name));
        roles
    }

    /// Returns the ancestors of a role, nearest parent first.
    ///
    /// The walk keeps a visited set so it terminates even if storage ever held
    /// a cycle; a revisit or a chain longer than `max_depth` is reported as an
    /// internal error so callers fail closed. A dangling or deleted parent ends
    /// the chain.
    pub fn ancestors(&self, role_id: RoleId) -> AppResult<Vec<&Role>> {
        let role = self
            .role(role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))?;

        let mut visited = HashSet::from([role_id]);
        let mut chain = Vec::new();
        let mut next = role.parent_role_id;

        while let Some(parent_id) = next {
            if !visited.insert(parent_id) {
                return Err(AppError::Internal(format!(
                    "role hierarchy contains a cycle through '{parent_id}'"
                )));
            }

            let Some(parent) = self.role(parent_id) else {
                break;
            };

            if chain.len() >= self.max_depth {
                return Err(AppError::Internal(format!(
                    "role hierarchy above '{role_id}' exceeds maximum depth {}",
                    self.max_depth
                )));
            }

            chain.push(parent);
            next = parent.parent_role_id;
        }

        Ok(chain)
    }

    /// Returns whether `candidate_id` is a strict ancestor of `of_id`.
    pub fn is_ancestor(&self, candidate_id: RoleId, of_id: RoleId) -> AppResult<bool> {
        Ok(self
            .ancestors(of_id)?
            .iter()
            .any(|role| role.id == candidate_id))
    }

    /// Returns every live role that inherits from `role_id`, excluding itself.
    #[must_use]
    pub fn descendants(&self, role_id: RoleId) -> Vec<RoleId> {
        let children = self.children_index();
        let mut visited = HashSet::from([role_id]);
        let mut queue = VecDeque::from([role_id]);
        let mut descendants = Vec::new();

        while let Some(current) = queue.pop_front() {
            for child in children.get(&current).into_iter().flatten() {
                if visited.insert(*child) {
                    descendants.push(*child);
                    queue.push_back(*child);
                }
            }
        }

        descendants.sort();
        descendants
    }

    /// Returns the union of permissions of a role and all of its ancestors.
    pub fn effective_permissions(&self, role_id: RoleId) -> AppResult<BTreeSet<Permission>> {
        let role = self
            .role(role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))?;

        let mut permissions = role.permissions.clone();
        for ancestor in self.ancestors(role_id)? {
            permissions.extend(ancestor.permissions.iter().copied());
        }

        Ok(permissions)
    }

    /// Returns whether a role grants something and every effective permission
    /// is tenant or self scoped. Such a role is only assignable with a tenant.
    pub fn is_tenant_only(&self, role_id: RoleId) -> AppResult<bool> {
        let effective = self.effective_permissions(role_id)?;
        Ok(!effective.is_empty()
            && effective
                .iter()
                .all(|permission| permission.scope().is_tenant_bound()))
    }

    /// Filters `role_ids` down to the live roles that are tenant-only in this
    /// snapshot. Ids missing from the graph are skipped.
    pub fn tenant_only_roles(
        &self,
        role_ids: impl IntoIterator<Item = RoleId>,
    ) -> AppResult<Vec<RoleId>> {
        let mut tenant_only = Vec::new();
        for role_id in role_ids {
            if self.role(role_id).is_some() && self.is_tenant_only(role_id)? {
                tenant_only.push(role_id);
            }
        }

        Ok(tenant_only)
    }

    /// Rejects an edit that leaves a globally assigned role tenant-only.
    ///
    /// Only roles in `role_ids` are checked; `globally_assigned` reports whether
    /// a role still has an assignment without a tenant.
    pub fn ensure_global_grants_allowed(
        &self,
        role_ids: impl IntoIterator<Item = RoleId>,
        globally_assigned: impl Fn(RoleId) -> bool,
    ) -> AppResult<()> {
        for role_id in self.tenant_only_roles(role_ids)? {
            if globally_assigned(role_id) {
                let name = self
                    .role(role_id)
                    .map(|role| role.name.as_str())
                    .unwrap_or_default();
                return Err(AppError::Validation(format!(
                    "role '{name}' would only grant tenant-scoped permissions but has global assignments"
                )));
            }
        }

        Ok(())
    }

    /// Validates making `parent_id` the parent of `role_id`.
    ///
    /// Rejects self-parenting and any edit where `role_id` already appears in
    /// the new parent's ancestor chain, and keeps the deepest resulting chain
    /// within `max_depth`.
    pub fn validate_parent(&self, role_id: RoleId, parent_id: Option<RoleId>) -> AppResult<()> {
        if self.role(role_id).is_none() {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        }

        let Some(parent_id) = parent_id else {
            return Ok(());
        };

        if parent_id == role_id {
            return Err(AppError::CyclicHierarchy { role_id, parent_id });
        }

        if self.role(parent_id).is_none() {
            return Err(AppError::NotFound(format!(
                "parent role '{parent_id}' was not found"
            )));
        }

        let parent_chain = self.ancestors(parent_id)?;
        if parent_chain.iter().any(|role| role.id == role_id) {
            return Err(AppError::CyclicHierarchy { role_id, parent_id });
        }

        let deepest_chain = parent_chain.len() + 1 + self.subtree_height(role_id);
        if deepest_chain > self.max_depth {
            return Err(AppError::Validation(format!(
                "role hierarchy would reach depth {deepest_chain}, maximum is {}",
                self.max_depth
            )));
        }

        Ok(())
    }

    /// Re-checks the hierarchy around `role_id` after an edit was applied.
    ///
    /// Storage adapters call this inside the write transaction so that two
    /// concurrent edits that each passed [`Self::validate_parent`] cannot
    /// commit a cycle together.
    pub fn revalidate_chain(&self, role_id: RoleId) -> AppResult<()> {
        let role = self
            .role(role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))?;

        if self.chain_revisits(role_id) {
            return Err(AppError::CyclicHierarchy {
                role_id,
                parent_id: role.parent_role_id.unwrap_or(role_id),
            });
        }

        for member in std::iter::once(role_id).chain(self.descendants(role_id)) {
            self.ancestors(member).map_err(|error| match error {
                AppError::Internal(message) => AppError::Validation(message),
                other => other,
            })?;
        }

        Ok(())
    }

    fn chain_revisits(&self, role_id: RoleId) -> bool {
        let mut visited = HashSet::from([role_id]);
        let mut next = self.role(role_id).and_then(|role| role.parent_role_id);

        while let Some(parent_id) = next {
            if !visited.insert(parent_id) {
                return true;
            }
            next = self.role(parent_id).and_then(|role| role.parent_role_id);
        }

        false
    }

    fn children_index(&self) -> HashMap<RoleId, Vec<RoleId>> {
        let mut children: HashMap<RoleId, Vec<RoleId>> = HashMap::new();
        for role in self.roles.values() {
            if let Some(parent_id) = role.parent_role_id {
                children.entry(parent_id).or_default().push(role.id);
            }
        }

        children
    }

    fn subtree_height(&self, role_id: RoleId) -> usize {
        let children = self.children_index();
        let mut visited = HashSet::from([role_id]);
        let mut frontier = vec![role_id];
        let mut height = 0;

        loop {
            let next = frontier
                .iter()
                .flat_map(|current| children.get(current).into_iter().flatten())
                .copied()
                .filter(|child| visited.insert(*child))
                .collect::<Vec<_>>();

            if next.is_empty() {
                return height;
            }

            height += 1;
            frontier = next;
        }
    }
}
