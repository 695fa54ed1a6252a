use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use praetor_application::RoleAssignmentRepository;
use praetor_core::{AppError, AppResult, AssignmentId, PrincipalId, RoleId, TenantId};
use praetor_domain::RoleAssignment;

use crate::postgres_rbac_support::{is_foreign_key_violation, is_unique_violation};

/// PostgreSQL-backed role assignment repository.
#[derive(Clone)]
pub struct PostgresRoleAssignmentRepository {
    pool: PgPool,
}

impl PostgresRoleAssignmentRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleAssignmentRow {
    id: Uuid,
    principal_id: Uuid,
    role_id: Uuid,
    tenant_id: Option<Uuid>,
    granted_by_id: Uuid,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<RoleAssignmentRow> for RoleAssignment {
    fn from(row: RoleAssignmentRow) -> Self {
        Self {
            id: AssignmentId::from_uuid(row.id),
            principal_id: PrincipalId::from_uuid(row.principal_id),
            role_id: RoleId::from_uuid(row.role_id),
            tenant_id: row.tenant_id.map(TenantId::from_uuid),
            granted_by_id: PrincipalId::from_uuid(row.granted_by_id),
            granted_at: row.granted_at,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl RoleAssignmentRepository for PostgresRoleAssignmentRepository {
    async fn insert_assignment(&self, assignment: RoleAssignment) -> AppResult<RoleAssignment> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin transaction: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO admin_role_assignments (
                id,
                principal_id,
                role_id,
                tenant_id,
                granted_by_id,
                granted_at,
                expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(assignment.id.as_uuid())
        .bind(assignment.principal_id.as_uuid())
        .bind(assignment.role_id.as_uuid())
        .bind(assignment.tenant_id.map(|tenant_id| tenant_id.as_uuid()))
        .bind(assignment.granted_by_id.as_uuid())
        .bind(assignment.granted_at)
        .bind(assignment.expires_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                return AppError::DuplicateAssignment {
                    principal_id: assignment.principal_id,
                    role_id: assignment.role_id,
                    tenant_id: assignment.tenant_id,
                };
            }

            if is_foreign_key_violation(&error) {
                return AppError::NotFound(format!(
                    "principal '{}' or role '{}' was not found",
                    assignment.principal_id, assignment.role_id
                ));
            }

            AppError::Internal(format!("failed to insert role assignment: {error}"))
        })?;

        bump_principal_version(&mut transaction, assignment.principal_id).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(assignment)
    }

    async fn delete_assignment(
        &self,
        principal_id: PrincipalId,
        role_id: RoleId,
        tenant_id: Option<TenantId>,
    ) -> AppResult<bool> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin transaction: {error}"))
        })?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM admin_role_assignments
            WHERE principal_id = $1
                AND role_id = $2
                AND tenant_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(principal_id.as_uuid())
        .bind(role_id.as_uuid())
        .bind(tenant_id.map(|tenant_id| tenant_id.as_uuid()))
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete role assignment: {error}")))?
        .rows_affected()
            > 0;

        if deleted {
            bump_principal_version(&mut transaction, principal_id).await?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(deleted)
    }

    async fn list_assignments_for_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, RoleAssignmentRow>(
            r#"
            SELECT id, principal_id, role_id, tenant_id, granted_by_id, granted_at, expires_at
            FROM admin_role_assignments
            WHERE principal_id = $1
            ORDER BY granted_at, id
            "#,
        )
        .bind(principal_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list role assignments for principal '{principal_id}': {error}"
            ))
        })?;

        Ok(rows.into_iter().map(RoleAssignment::from).collect())
    }

    async fn list_applicable_assignments(
        &self,
        principal_id: PrincipalId,
        tenant_context: Option<TenantId>,
        as_of: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, RoleAssignmentRow>(
            r#"
            SELECT id, principal_id, role_id, tenant_id, granted_by_id, granted_at, expires_at
            FROM admin_role_assignments
            WHERE principal_id = $1
                AND (tenant_id IS NULL OR tenant_id = $2)
                AND (expires_at IS NULL OR expires_at > $3)
            ORDER BY granted_at, id
            "#,
        )
        .bind(principal_id.as_uuid())
        .bind(tenant_context.map(|tenant_id| tenant_id.as_uuid()))
        .bind(as_of)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load applicable role assignments for principal '{principal_id}': {error}"
            ))
        })?;

        Ok(rows.into_iter().map(RoleAssignment::from).collect())
    }
}

async fn bump_principal_version(
    transaction: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    principal_id: PrincipalId,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE admin_principals
        SET assignment_version = assignment_version + 1,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(principal_id.as_uuid())
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to bump assignment version for principal '{principal_id}': {error}"
        ))
    })?;

    Ok(())
}
