use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use praetor_application::{PermissionCache, PermissionCacheKey, ResolvedPermissions};
use praetor_core::AppResult;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct ResolutionCacheEntry {
    resolution: ResolvedPermissions,
    expires_at: Instant,
}

/// In-memory cache adapter for resolved permission sets.
#[derive(Default)]
pub struct InMemoryPermissionCache {
    entries: RwLock<HashMap<PermissionCacheKey, ResolutionCacheEntry>>,
}

impl InMemoryPermissionCache {
    /// Creates an empty in-memory permission cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired entries, including those keyed by superseded versions.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);

        before - entries.len()
    }
}

#[async_trait]
impl PermissionCache for InMemoryPermissionCache {
    async fn get_resolution(
        &self,
        key: PermissionCacheKey,
    ) -> AppResult<Option<ResolvedPermissions>> {
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.resolution.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(&key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(&key);
        }

        Ok(None)
    }

    async fn set_resolution(
        &self,
        key: PermissionCacheKey,
        resolution: &ResolvedPermissions,
        ttl_seconds: u32,
    ) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(u64::from(ttl_seconds)))
            .unwrap_or(now);

        self.entries.write().await.insert(
            key,
            ResolutionCacheEntry {
                resolution: resolution.clone(),
                expires_at,
            },
        );

        Ok(())
    }
}
