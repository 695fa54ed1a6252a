//! Redis-backed permission resolution cache.

use async_trait::async_trait;
use praetor_application::{PermissionCache, PermissionCacheKey, ResolvedPermissions};
use praetor_core::{AppError, AppResult};
use redis::AsyncCommands;

/// Redis implementation of the permission cache port.
///
/// Entries are JSON-encoded and expire through Redis TTLs; superseded
/// versions are never read again and age out on their own.
#[derive(Clone)]
pub struct RedisPermissionCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisPermissionCache {
    /// Creates a cache adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: PermissionCacheKey) -> String {
        let tenant = key
            .tenant_context
            .map_or_else(|| "global".to_owned(), |tenant_id| tenant_id.to_string());

        format!(
            "{}:principal={}:tenant={}:version={}",
            self.key_prefix, key.principal_id, tenant, key.assignment_version
        )
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl PermissionCache for RedisPermissionCache {
    async fn get_resolution(
        &self,
        key: PermissionCacheKey,
    ) -> AppResult<Option<ResolvedPermissions>> {
        let redis_key = self.key_for(key);
        let mut connection = self.connection().await?;

        let encoded: Option<String> = connection.get(redis_key).await.map_err(|error| {
            AppError::Internal(format!("failed to read permission cache entry: {error}"))
        })?;

        encoded
            .as_deref()
            .map(|value| {
                serde_json::from_str::<ResolvedPermissions>(value).map_err(|error| {
                    AppError::Internal(format!("invalid permission cache entry: {error}"))
                })
            })
            .transpose()
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

        let redis_key = self.key_for(key);
        let value = serde_json::to_string(resolution).map_err(|error| {
            AppError::Internal(format!("failed to encode permission cache entry: {error}"))
        })?;
        let mut connection = self.connection().await?;

        connection
            .set_ex(redis_key, value, u64::from(ttl_seconds))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to write permission cache entry: {error}"))
            })
    }
}
