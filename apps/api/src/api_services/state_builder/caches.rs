use std::sync::Arc;
use std::time::Duration;

use praetor_application::PermissionCache;
use praetor_infrastructure::{InMemoryPermissionCache, RedisPermissionCache};

use crate::api_config::ApiConfig;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Uses redis when `REDIS_URL` is configured, otherwise a process-local cache
/// whose stale entries are purged in the background.
pub(super) fn build_permission_cache(
    config: &ApiConfig,
    redis_client: Option<redis::Client>,
) -> Arc<dyn PermissionCache> {
    if let Some(redis_client) = redis_client {
        tracing::info!(key_prefix = %config.redis_key_prefix, "using redis permission cache");
        return Arc::new(RedisPermissionCache::new(
            redis_client,
            config.redis_key_prefix.as_str(),
        ));
    }

    let cache = Arc::new(InMemoryPermissionCache::new());
    let purged_cache = cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purged_cache.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "purged expired permission cache entries");
            }
        }
    });

    cache
}
