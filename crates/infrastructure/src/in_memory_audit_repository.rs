use async_trait::async_trait;
use tokio::sync::RwLock;

use praetor_application::{AuditLogQuery, AuditRepository};
use praetor_core::AppResult;
use praetor_domain::AuditEntry;

/// In-memory append-only audit repository.
#[derive(Debug, Default)]
pub struct InMemoryAuditRepository {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditRepository {
    /// Creates an empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append_entry(&self, entry: AuditEntry) -> AppResult<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn list_entries(&self, query: AuditLogQuery) -> AppResult<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        let mut matching = entries
            .iter()
            .filter(|entry| query.action.is_none_or(|action| entry.action == action))
            .filter(|entry| query.actor_id.is_none_or(|actor_id| entry.actor_id == actor_id))
            .filter(|entry| {
                query
                    .tenant_id
                    .is_none_or(|tenant_id| entry.tenant_id == Some(tenant_id))
            })
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.id.cmp(&left.id))
        });

        Ok(matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use praetor_application::{AuditLogQuery, AuditRepository};
    use praetor_core::{PrincipalId, TenantId};
    use praetor_domain::{AuditAction, AuditEntry};

    use super::InMemoryAuditRepository;

    #[tokio::test]
    async fn lists_newest_first_with_filters_and_paging() {
        let repository = InMemoryAuditRepository::new();
        let actor = PrincipalId::new();
        let tenant = TenantId::new();
        let mut oldest = AuditEntry::new(actor, AuditAction::RoleCreated, "role", "a");
        oldest.created_at = Utc::now() - Duration::minutes(2);
        let mut middle = AuditEntry::new(actor, AuditAction::RoleAssigned, "role_assignment", "b")
            .with_tenant(Some(tenant));
        middle.created_at = Utc::now() - Duration::minutes(1);
        let newest = AuditEntry::new(PrincipalId::new(), AuditAction::RoleAssigned, "role", "c");

        for entry in [oldest.clone(), middle.clone(), newest.clone()] {
            assert!(repository.append_entry(entry).await.is_ok());
        }

        let all = repository.list_entries(AuditLogQuery::default()).await;
        let by_actor = repository
            .list_entries(AuditLogQuery {
                actor_id: Some(actor),
                ..AuditLogQuery::default()
            })
            .await;
        let by_action_page = repository
            .list_entries(AuditLogQuery {
                action: Some(AuditAction::RoleAssigned),
                limit: 1,
                offset: 1,
                ..AuditLogQuery::default()
            })
            .await;
        let by_tenant = repository
            .list_entries(AuditLogQuery {
                tenant_id: Some(tenant),
                ..AuditLogQuery::default()
            })
            .await;

        let ids = |entries: Vec<AuditEntry>| entries.into_iter().map(|entry| entry.id).collect::<Vec<_>>();
        assert_eq!(ids(all.unwrap_or_default()), vec![newest.id, middle.id, oldest.id]);
        assert_eq!(ids(by_actor.unwrap_or_default()), vec![middle.id, oldest.id]);
        assert_eq!(ids(by_action_page.unwrap_or_default()), vec![middle.id]);
        assert_eq!(ids(by_tenant.unwrap_or_default()), vec![middle.id]);
    }
}
