use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use praetor_core::{AppError, AppResult, AssignmentId, PrincipalId, RoleId, TenantId};
use praetor_domain::{AdminPrincipal, Permission, PermissionCheck, RoleName};
use serde::{Deserialize, Serialize};

use crate::role_hierarchy_service::load_role_graph;
use crate::{
    EngineConfig, PermissionCache, PermissionCacheKey, PrincipalRepository,
    RoleAssignmentRepository, RoleRepository,
};

/// One permission reached through one assignment, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGrant {
    /// Granted permission.
    pub permission: Permission,
    /// Role that carries the permission directly.
    pub role_id: RoleId,
    /// Role named by the assignment; differs from `role_id` when inherited.
    pub assigned_role_id: RoleId,
    /// Assignment the permission flows through.
    pub assignment_id: AssignmentId,
    /// Tenant the assignment is scoped to.
    pub grant_tenant: Option<TenantId>,
    /// Expiry of the assignment.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ResolvedGrant {
    /// Returns whether this grant satisfies `check` in `tenant_context`.
    #[must_use]
    pub fn covers(&self, check: &PermissionCheck, tenant_context: Option<TenantId>) -> bool {
        check.is_covered_by(self.permission, self.grant_tenant, tenant_context)
    }
}

/// One role held through one assignment, directly or by inheritance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRole {
    /// Held role.
    pub role_id: RoleId,
    /// Held role name.
    pub role_name: RoleName,
    /// Role named by the assignment.
    pub assigned_role_id: RoleId,
    /// Assignment the role is held through.
    pub assignment_id: AssignmentId,
    /// Tenant the assignment is scoped to.
    pub grant_tenant: Option<TenantId>,
    /// Whether the role is an ancestor of the assigned role.
    pub inherited: bool,
    /// Expiry of the assignment.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Permissions and roles a principal holds in one tenant context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPermissions {
    /// Resolved principal.
    pub principal_id: PrincipalId,
    /// Tenant context of the resolution.
    pub tenant_context: Option<TenantId>,
    /// Permission grants in deterministic order.
    pub grants: Vec<ResolvedGrant>,
    /// Held roles in deterministic order, direct holdings first per name.
    pub roles: Vec<ResolvedRole>,
}

impl ResolvedPermissions {
    /// Returns the distinct permissions.
    #[must_use]
    pub fn permissions(&self) -> BTreeSet<Permission> {
        self.grants.iter().map(|grant| grant.permission).collect()
    }

    /// Returns whether the exact permission was resolved.
    #[must_use]
    pub fn contains(&self, permission: Permission) -> bool {
        self.grants.iter().any(|grant| grant.permission == permission)
    }

    /// Returns the first grant that satisfies `check` in this context.
    #[must_use]
    pub fn find_grant(&self, check: &PermissionCheck) -> Option<&ResolvedGrant> {
        self.grants
            .iter()
            .find(|grant| grant.covers(check, self.tenant_context))
    }

    /// Returns the holding of a role by name.
    ///
    /// Only role identity counts; with `include_ancestors` a role inherited
    /// through the hierarchy matches as well.
    #[must_use]
    pub fn find_role(&self, role_name: &str, include_ancestors: bool) -> Option<&ResolvedRole> {
        self.roles.iter().find(|role| {
            role.role_name.as_str() == role_name && (include_ancestors || !role.inherited)
        })
    }

    /// Returns the earliest expiry among contributing assignments.
    #[must_use]
    pub fn earliest_expiry(&self) -> Option<DateTime<Utc>> {
        self.roles.iter().filter_map(|role| role.expires_at).min()
    }
}

/// Resolves the effective permissions of a principal.
///
/// Resolution is a pure function of the applicable assignments and the role
/// hierarchy at `as_of`; the optional cache is keyed by the principal's
/// assignment version so writes invalidate it without coordination.
#[derive(Clone)]
pub struct PermissionResolver {
    principal_repository: Arc<dyn PrincipalRepository>,
    assignment_repository: Arc<dyn RoleAssignmentRepository>,
    role_repository: Arc<dyn RoleRepository>,
    cache: Option<Arc<dyn PermissionCache>>,
    config: EngineConfig,
}

impl PermissionResolver {
    /// Creates a resolver without a cache.
    #[must_use]
    pub fn new(
        principal_repository: Arc<dyn PrincipalRepository>,
        assignment_repository: Arc<dyn RoleAssignmentRepository>,
        role_repository: Arc<dyn RoleRepository>,
        config: EngineConfig,
    ) -> Self {
        Self {
            principal_repository,
            assignment_repository,
            role_repository,
            cache: None,
            config,
        }
    }

    /// Puts a read-through cache in front of the resolver.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn PermissionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolves permissions for a principal id at the current time.
    pub async fn resolve_permissions(
        &self,
        principal_id: PrincipalId,
        tenant_context: Option<TenantId>,
    ) -> AppResult<ResolvedPermissions> {
        let principal = self.find_principal(principal_id).await?;
        self.resolve_for_principal(&principal, tenant_context).await
    }

    /// Resolves permissions for an already loaded principal, consulting the
    /// cache when configured.
    pub async fn resolve_for_principal(
        &self,
        principal: &AdminPrincipal,
        tenant_context: Option<TenantId>,
    ) -> AppResult<ResolvedPermissions> {
        let now = Utc::now();
        let Some(cache) = self
            .cache
            .as_ref()
            .filter(|_| self.config.permission_cache_ttl_seconds > 0)
        else {
            return self.resolve_uncached(principal.id, tenant_context, now).await;
        };

        let key = PermissionCacheKey {
            principal_id: principal.id,
            tenant_context,
            assignment_version: principal.assignment_version,
        };

        match cache.get_resolution(key).await {
            Ok(Some(cached)) if cached.earliest_expiry().is_none_or(|expiry| expiry > now) => {
                return Ok(cached);
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(
                    principal_id = %principal.id,
                    error = %error,
                    "permission cache read failed, resolving from store"
                );
            }
        }

        let resolved = self
            .resolve_uncached(principal.id, tenant_context, now)
            .await?;

        let ttl_seconds = self.cache_ttl_seconds(&resolved, now);
        if ttl_seconds > 0
            && let Err(error) = cache.set_resolution(key, &resolved, ttl_seconds).await
        {
            tracing::warn!(
                principal_id = %principal.id,
                error = %error,
                "permission cache write failed"
            );
        }

        Ok(resolved)
    }

    /// Resolves permissions as of a fixed instant, bypassing the cache.
    pub async fn resolve_permissions_at(
        &self,
        principal_id: PrincipalId,
        tenant_context: Option<TenantId>,
        as_of: DateTime<Utc>,
    ) -> AppResult<ResolvedPermissions> {
        self.find_principal(principal_id).await?;
        self.resolve_uncached(principal_id, tenant_context, as_of)
            .await
    }

    async fn find_principal(&self, principal_id: PrincipalId) -> AppResult<AdminPrincipal> {
        self.principal_repository
            .find_principal(principal_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("principal '{principal_id}' was not found")))
    }

    async fn resolve_uncached(
        &self,
        principal_id: PrincipalId,
        tenant_context: Option<TenantId>,
        as_of: DateTime<Utc>,
    ) -> AppResult<ResolvedPermissions> {
        let assignments = self
            .assignment_repository
            .list_applicable_assignments(principal_id, tenant_context, as_of)
            .await?;
        let graph = load_role_graph(
            self.role_repository.as_ref(),
            self.config.max_hierarchy_depth,
        )
        .await?;

        let mut grants = Vec::new();
        let mut roles = Vec::new();

        for assignment in assignments.iter().filter(|assignment| {
            assignment.principal_id == principal_id
                && assignment.applies_to(tenant_context)
                && assignment.is_active_at(as_of)
        }) {
            let Some(assigned_role) = graph.role(assignment.role_id) else {
                tracing::debug!(
                    assignment_id = %assignment.id,
                    role_id = %assignment.role_id,
                    "skipping assignment of deleted role"
                );
                continue;
            };

            let chain = std::iter::once(assigned_role).chain(graph.ancestors(assigned_role.id)?);
            for (position, role) in chain.enumerate() {
                roles.push(ResolvedRole {
                    role_id: role.id,
                    role_name: role.name.clone(),
                    assigned_role_id: assigned_role.id,
                    assignment_id: assignment.id,
                    grant_tenant: assignment.tenant_id,
                    inherited: position > 0,
                    expires_at: assignment.expires_at,
                });

                grants.extend(role.permissions.iter().map(|permission| ResolvedGrant {
                    permission: *permission,
                    role_id: role.id,
                    assigned_role_id: assigned_role.id,
                    assignment_id: assignment.id,
                    grant_tenant: assignment.tenant_id,
                    expires_at: assignment.expires_at,
                }));
            }
        }

        grants.sort_by(|left, right| {
            (left.permission, left.assignment_id, left.role_id).cmp(&(
                right.permission,
                right.assignment_id,
                right.role_id,
            ))
        });
        grants.dedup();
        roles.sort_by(|left, right| {
            (&left.role_name, left.inherited, left.assignment_id).cmp(&(
                &right.role_name,
                right.inherited,
                right.assignment_id,
            ))
        });
        roles.dedup();

        Ok(ResolvedPermissions {
            principal_id,
            tenant_context,
            grants,
            roles,
        })
    }

    fn cache_ttl_seconds(&self, resolved: &ResolvedPermissions, now: DateTime<Utc>) -> u32 {
        let configured = self.config.permission_cache_ttl_seconds;
        match resolved.earliest_expiry() {
            None => configured,
            Some(expiry) => {
                let remaining = (expiry - now).num_seconds();
                if remaining < 1 {
                    0
                } else {
                    u32::try_from(remaining).map_or(configured, |remaining| remaining.min(configured))
                }
            }
        }
    }
}
