use std::net::IpAddr;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use praetor_application::{AuditLogQuery, AuditRepository};
use praetor_core::{AppError, AppResult, AuditEntryId, PrincipalId, TenantId};
use praetor_domain::{AuditAction, AuditEntry};

/// PostgreSQL-backed append-only audit repository.
#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditEntryRow {
    id: Uuid,
    actor_id: Uuid,
    action: String,
    target_type: String,
    target_id: String,
    tenant_id: Option<Uuid>,
    details: Value,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditEntryRow> for AuditEntry {
    type Error = AppError;

    fn try_from(row: AuditEntryRow) -> Result<Self, Self::Error> {
        let action = AuditAction::from_str(row.action.as_str()).map_err(|error| {
            AppError::Internal(format!("audit entry '{}' has unknown action: {error}", row.id))
        })?;
        let ip_address = row
            .ip_address
            .as_deref()
            .map(IpAddr::from_str)
            .transpose()
            .map_err(|error| {
                AppError::Internal(format!(
                    "audit entry '{}' has invalid ip address: {error}",
                    row.id
                ))
            })?;

        Ok(Self {
            id: AuditEntryId::from_uuid(row.id),
            actor_id: PrincipalId::from_uuid(row.actor_id),
            action,
            target_type: row.target_type,
            target_id: row.target_id,
            tenant_id: row.tenant_id.map(TenantId::from_uuid),
            details: row.details,
            ip_address,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append_entry(&self, entry: AuditEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_audit_entries (
                id,
                actor_id,
                action,
                target_type,
                target_id,
                tenant_id,
                details,
                ip_address,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.actor_id.as_uuid())
        .bind(entry.action.as_str())
        .bind(entry.target_type)
        .bind(entry.target_id)
        .bind(entry.tenant_id.map(|tenant_id| tenant_id.as_uuid()))
        .bind(entry.details)
        .bind(entry.ip_address.map(|ip_address| ip_address.to_string()))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to append audit entry: {error}")))?;

        Ok(())
    }

    async fn list_entries(&self, query: AuditLogQuery) -> AppResult<Vec<AuditEntry>> {
        let limit = i64::try_from(query.limit).map_err(|error| {
            AppError::Validation(format!("invalid audit query limit: {error}"))
        })?;
        let offset = i64::try_from(query.offset).map_err(|error| {
            AppError::Validation(format!("invalid audit query offset: {error}"))
        })?;

        let rows = sqlx::query_as::<_, AuditEntryRow>(
            r#"
            SELECT
                id,
                actor_id,
                action,
                target_type,
                target_id,
                tenant_id,
                details,
                ip_address,
                created_at
            FROM admin_audit_entries
            WHERE ($1::TEXT IS NULL OR action = $1)
                AND ($2::UUID IS NULL OR actor_id = $2)
                AND ($3::UUID IS NULL OR tenant_id = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            OFFSET $5
            "#,
        )
        .bind(query.action.map(|action| action.as_str()))
        .bind(query.actor_id.map(|actor_id| actor_id.as_uuid()))
        .bind(query.tenant_id.map(|tenant_id| tenant_id.as_uuid()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list audit entries: {error}")))?;

        rows.into_iter().map(AuditEntry::try_from).collect()
    }
}
