use async_trait::async_trait;

use praetor_core::{AppResult, PrincipalId, TenantId};
use praetor_domain::{AuditAction, AuditEntry};

/// Query parameters for audit log listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogQuery {
    /// Maximum rows returned.
    pub limit: usize,
    /// Number of rows skipped for offset pagination.
    pub offset: usize,
    /// Optional action filter.
    pub action: Option<AuditAction>,
    /// Optional actor filter.
    pub actor_id: Option<PrincipalId>,
    /// Optional tenant filter.
    pub tenant_id: Option<TenantId>,
}

impl Default for AuditLogQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            action: None,
            actor_id: None,
            tenant_id: None,
        }
    }
}

/// Append-only audit sink.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Appends one entry.
    async fn append_entry(&self, entry: AuditEntry) -> AppResult<()>;

    /// Lists entries newest first.
    async fn list_entries(&self, query: AuditLogQuery) -> AppResult<Vec<AuditEntry>>;
}
