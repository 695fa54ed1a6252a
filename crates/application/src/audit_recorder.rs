use std::sync::Arc;

use praetor_core::AppResult;
use praetor_domain::AuditEntry;

use crate::{AuditLogQuery, AuditRepository};

const MAX_AUDIT_PAGE_SIZE: usize = 500;

/// Writes audit entries without letting sink failures reach callers.
#[derive(Clone)]
pub struct AuditRecorder {
    repository: Arc<dyn AuditRepository>,
}

impl AuditRecorder {
    /// Creates a recorder over an audit repository.
    #[must_use]
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self { repository }
    }

    /// Appends one entry.
    ///
    /// A failed append is logged and dropped; a decision that has already
    /// been made is never changed by the audit sink.
    pub async fn record(&self, entry: AuditEntry) {
        let action = entry.action;
        let actor_id = entry.actor_id;
        let target_id = entry.target_id.clone();

        if let Err(error) = self.repository.append_entry(entry).await {
            tracing::error!(
                action = action.as_str(),
                actor_id = %actor_id,
                target_id = %target_id,
                error = %error,
                "failed to append audit entry"
            );
        }
    }

    /// Lists entries newest first, clamping the page size.
    pub async fn list_entries(&self, query: AuditLogQuery) -> AppResult<Vec<AuditEntry>> {
        let query = AuditLogQuery {
            limit: query.limit.clamp(1, MAX_AUDIT_PAGE_SIZE),
            ..query
        };

        self.repository.list_entries(query).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use praetor_core::PrincipalId;
    use praetor_domain::{AuditAction, AuditEntry};

    use crate::AuditLogQuery;
    use crate::test_fakes::FakeAuditRepository;

    use super::AuditRecorder;

    #[tokio::test]
    async fn record_swallows_sink_failures() {
        let repository = Arc::new(FakeAuditRepository::failing());
        let recorder = AuditRecorder::new(repository.clone());

        recorder
            .record(AuditEntry::new(
                PrincipalId::new(),
                AuditAction::AccessDenied,
                "permission",
                "order:read@global",
            ))
            .await;

        assert!(repository.entries().await.is_empty());
    }

    #[tokio::test]
    async fn list_entries_clamps_page_size() {
        let repository = Arc::new(FakeAuditRepository::default());
        let recorder = AuditRecorder::new(repository.clone());

        for _ in 0..3 {
            recorder
                .record(AuditEntry::new(
                    PrincipalId::new(),
                    AuditAction::RoleCreated,
                    "role",
                    "ops",
                ))
                .await;
        }

        let page = recorder
            .list_entries(AuditLogQuery {
                limit: 0,
                ..AuditLogQuery::default()
            })
            .await;

        assert!(matches!(page, Ok(ref entries) if entries.len() == 1));
    }
}
