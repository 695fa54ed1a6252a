use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, Postgres, Transaction};
use uuid::Uuid;

use praetor_core::{AppError, AppResult, RoleId};
use praetor_domain::{Permission, Role, RoleName};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const SERIALIZATION_FAILURE: &str = "40001";

#[derive(Debug, FromRow)]
pub(crate) struct RoleRow {
    id: Uuid,
    name: String,
    description: String,
    is_system_role: bool,
    parent_role_id: Option<Uuid>,
    version: i64,
    deleted_at: Option<DateTime<Utc>>,
    permissions: Vec<String>,
}

impl TryFrom<RoleRow> for Role {
    type Error = AppError;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        let permissions = row
            .permissions
            .iter()
            .map(|value| {
                Permission::from_transport(value).map_err(|error| {
                    AppError::Internal(format!(
                        "role '{}' stores permission outside the catalog: {error}",
                        row.id
                    ))
                })
            })
            .collect::<AppResult<BTreeSet<_>>>()?;

        Ok(Self {
            id: RoleId::from_uuid(row.id),
            name: RoleName::new(row.name).map_err(|error| {
                AppError::Internal(format!("role '{}' has an invalid stored name: {error}", row.id))
            })?,
            description: row.description,
            is_system_role: row.is_system_role,
            parent_role_id: row.parent_role_id.map(RoleId::from_uuid),
            permissions,
            version: row.version,
            deleted_at: row.deleted_at,
        })
    }
}

/// Loads live roles, optionally narrowed to one id or one name.
pub(crate) async fn fetch_live_roles<'e>(
    executor: impl PgExecutor<'e>,
    role_id: Option<RoleId>,
    name: Option<&str>,
) -> AppResult<Vec<Role>> {
    let rows = sqlx::query_as::<_, RoleRow>(
        r#"
        SELECT
            roles.id,
            roles.name,
            roles.description,
            roles.is_system_role,
            roles.parent_role_id,
            roles.version,
            roles.deleted_at,
            COALESCE(
                array_agg(grants.permission ORDER BY grants.permission)
                    FILTER (WHERE grants.permission IS NOT NULL),
                ARRAY[]::TEXT[]
            ) AS permissions
        FROM admin_roles roles
        LEFT JOIN admin_role_permissions grants ON grants.role_id = roles.id
        WHERE roles.deleted_at IS NULL
            AND ($1::UUID IS NULL OR roles.id = $1)
            AND ($2::TEXT IS NULL OR roles.name = $2)
        GROUP BY roles.id
        ORDER BY roles.name
        "#,
    )
    .bind(role_id.map(|role_id| role_id.as_uuid()))
    .bind(name)
    .fetch_all(executor)
    .await
    .map_err(|error| AppError::Internal(format!("failed to load roles: {error}")))?;

    rows.into_iter().map(Role::try_from).collect()
}

/// Opens a transaction at SERIALIZABLE isolation for hierarchy edits.
pub(crate) async fn begin_serializable(
    pool: &sqlx::PgPool,
) -> AppResult<Transaction<'static, Postgres>> {
    let mut transaction = pool
        .begin()
        .await
        .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to set transaction isolation: {error}"))
        })?;

    Ok(transaction)
}

/// Commits, reporting serialization failures as retryable conflicts.
pub(crate) async fn commit(transaction: Transaction<'_, Postgres>) -> AppResult<()> {
    transaction
        .commit()
        .await
        .map_err(|error| map_write_error(error, "failed to commit transaction"))
}

/// Bumps the assignment version of every principal holding one of `role_ids`.
pub(crate) async fn bump_versions_for_roles(
    transaction: &mut Transaction<'_, Postgres>,
    role_ids: &[RoleId],
) -> AppResult<u64> {
    let role_ids = role_ids
        .iter()
        .map(|role_id| role_id.as_uuid())
        .collect::<Vec<_>>();

    let result = sqlx::query(
        r#"
        UPDATE admin_principals
        SET assignment_version = assignment_version + 1,
            updated_at = now()
        WHERE id IN (
            SELECT DISTINCT principal_id
            FROM admin_role_assignments
            WHERE role_id = ANY($1)
        )
        "#,
    )
    .bind(role_ids)
    .execute(&mut **transaction)
    .await
    .map_err(|error| map_write_error(error, "failed to bump principal versions"))?;

    Ok(result.rows_affected())
}

pub(crate) fn is_database_error(error: &sqlx::Error, code: &str) -> bool {
    if let sqlx::Error::Database(database_error) = error
        && database_error.code().as_deref() == Some(code)
    {
        return true;
    }

    false
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    is_database_error(error, UNIQUE_VIOLATION)
}

pub(crate) fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    is_database_error(error, FOREIGN_KEY_VIOLATION)
}

/// Maps a write failure, turning serialization failures into `Conflict`.
pub(crate) fn map_write_error(error: sqlx::Error, context: &str) -> AppError {
    if is_database_error(&error, SERIALIZATION_FAILURE) {
        return AppError::Conflict(
            "concurrent role hierarchy edit detected, retry the request".to_owned(),
        );
    }

    AppError::Internal(format!("{context}: {error}"))
}
