use async_trait::async_trait;

use praetor_core::{AppResult, PrincipalId, TenantId};

use crate::ResolvedPermissions;

/// Version-tagged cache key for one resolution.
///
/// `assignment_version` moves on every change that can affect the principal's
/// resolution, so a stale entry is simply never looked up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionCacheKey {
    /// Principal whose permissions were resolved.
    pub principal_id: PrincipalId,
    /// Tenant context of the resolution.
    pub tenant_context: Option<TenantId>,
    /// Principal assignment version at resolution time.
    pub assignment_version: i64,
}

/// Optional read-through cache in front of the permission resolver.
#[async_trait]
pub trait PermissionCache: Send + Sync {
    /// Returns a cached resolution.
    async fn get_resolution(
        &self,
        key: PermissionCacheKey,
    ) -> AppResult<Option<ResolvedPermissions>>;

    /// Stores a resolution with ttl; a zero ttl stores nothing.
    async fn set_resolution(
        &self,
        key: PermissionCacheKey,
        resolution: &ResolvedPermissions,
        ttl_seconds: u32,
    ) -> AppResult<()>;
}
