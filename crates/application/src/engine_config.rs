use praetor_core::{AppError, AppResult};
use praetor_domain::DEFAULT_MAX_HIERARCHY_DEPTH;

const MAX_HIERARCHY_DEPTH_LIMIT: usize = 64;
const MAX_PERMISSION_CACHE_TTL_SECONDS: u32 = 300;

/// Tunables shared by the engine services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Longest ancestor chain a role may have.
    pub max_hierarchy_depth: usize,
    /// Upper bound on how long a cached resolution may be served. Zero
    /// disables caching.
    pub permission_cache_ttl_seconds: u32,
    /// Whether allowed checks are written to the audit trail as well.
    pub audit_successful_checks: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: DEFAULT_MAX_HIERARCHY_DEPTH,
            permission_cache_ttl_seconds: 45,
            audit_successful_checks: false,
        }
    }
}

impl EngineConfig {
    /// Validates the configured bounds.
    pub fn validate(&self) -> AppResult<()> {
        if !(1..=MAX_HIERARCHY_DEPTH_LIMIT).contains(&self.max_hierarchy_depth) {
            return Err(AppError::Validation(format!(
                "max_hierarchy_depth must be between 1 and {MAX_HIERARCHY_DEPTH_LIMIT}, got {}",
                self.max_hierarchy_depth
            )));
        }

        if self.permission_cache_ttl_seconds > MAX_PERMISSION_CACHE_TTL_SECONDS {
            return Err(AppError::Validation(format!(
                "permission_cache_ttl_seconds must be at most {MAX_PERMISSION_CACHE_TTL_SECONDS}, got {}",
                self.permission_cache_ttl_seconds
            )));
        }

        Ok(())
    }
}
