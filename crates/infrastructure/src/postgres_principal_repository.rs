use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use praetor_application::{PrincipalRepository, PrincipalUpsert};
use praetor_core::{AppError, AppResult, PrincipalId};
use praetor_domain::{AdminPrincipal, parse_ip_ranges};

const PRINCIPAL_COLUMNS: &str = r#"
    id,
    external_identity_ref,
    email,
    is_active,
    is_super_admin,
    require_mfa,
    allowed_ip_ranges,
    last_login_at,
    assignment_version
"#;

/// PostgreSQL-backed administrative principal repository.
#[derive(Clone)]
pub struct PostgresPrincipalRepository {
    pool: PgPool,
}

impl PostgresPrincipalRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct PrincipalRow {
    id: Uuid,
    external_identity_ref: String,
    email: Option<String>,
    is_active: bool,
    is_super_admin: bool,
    require_mfa: bool,
    allowed_ip_ranges: Vec<String>,
    last_login_at: Option<DateTime<Utc>>,
    assignment_version: i64,
}

impl TryFrom<PrincipalRow> for AdminPrincipal {
    type Error = AppError;

    fn try_from(row: PrincipalRow) -> Result<Self, Self::Error> {
        let allowed_ip_ranges = parse_ip_ranges(&row.allowed_ip_ranges).map_err(|error| {
            AppError::Internal(format!(
                "principal '{}' stores an invalid ip allow-list: {error}",
                row.id
            ))
        })?;

        Ok(Self {
            id: PrincipalId::from_uuid(row.id),
            external_identity_ref: row.external_identity_ref,
            email: row.email,
            is_active: row.is_active,
            is_super_admin: row.is_super_admin,
            require_mfa: row.require_mfa,
            allowed_ip_ranges,
            last_login_at: row.last_login_at,
            assignment_version: row.assignment_version,
        })
    }
}

impl PostgresPrincipalRepository {
    async fn fetch_required(&self, principal_id: PrincipalId) -> AppResult<AdminPrincipal> {
        self.find_principal(principal_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("principal '{principal_id}' was not found")))
    }
}

#[async_trait]
impl PrincipalRepository for PostgresPrincipalRepository {
    async fn find_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Option<AdminPrincipal>> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM admin_principals WHERE id = $1"
        ))
        .bind(principal_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load principal '{principal_id}': {error}"))
        })?;

        row.map(AdminPrincipal::try_from).transpose()
    }

    async fn find_principal_by_external_ref(
        &self,
        external_ref: &str,
    ) -> AppResult<Option<AdminPrincipal>> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM admin_principals WHERE external_identity_ref = $1"
        ))
        .bind(external_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load principal by reference '{external_ref}': {error}"
            ))
        })?;

        row.map(AdminPrincipal::try_from).transpose()
    }

    async fn upsert_principal(&self, upsert: PrincipalUpsert) -> AppResult<AdminPrincipal> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            r#"
            INSERT INTO admin_principals (id, external_identity_ref, email, is_super_admin, last_login_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (external_identity_ref) DO UPDATE
            SET email = EXCLUDED.email,
                is_super_admin = EXCLUDED.is_super_admin,
                last_login_at = EXCLUDED.last_login_at,
                updated_at = now()
            RETURNING {PRINCIPAL_COLUMNS}
            "#
        ))
        .bind(PrincipalId::new().as_uuid())
        .bind(upsert.external_ref.as_str())
        .bind(upsert.email.as_deref())
        .bind(upsert.is_super_admin)
        .bind(upsert.login_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to upsert principal '{}': {error}",
                upsert.external_ref
            ))
        })?;

        AdminPrincipal::try_from(row)
    }

    async fn set_active(
        &self,
        principal_id: PrincipalId,
        is_active: bool,
    ) -> AppResult<AdminPrincipal> {
        let updated = sqlx::query(
            r#"
            UPDATE admin_principals
            SET is_active = $2,
                assignment_version = assignment_version + 1,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(principal_id.as_uuid())
        .bind(is_active)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update active flag for principal '{principal_id}': {error}"
            ))
        })?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "principal '{principal_id}' was not found"
            )));
        }

        self.fetch_required(principal_id).await
    }

    async fn update_security_settings(
        &self,
        principal_id: PrincipalId,
        require_mfa: bool,
        allowed_ip_ranges: Vec<IpNet>,
    ) -> AppResult<AdminPrincipal> {
        let ranges = allowed_ip_ranges
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        let updated = sqlx::query(
            r#"
            UPDATE admin_principals
            SET require_mfa = $2,
                allowed_ip_ranges = $3,
                assignment_version = assignment_version + 1,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(principal_id.as_uuid())
        .bind(require_mfa)
        .bind(ranges)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update security settings for principal '{principal_id}': {error}"
            ))
        })?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "principal '{principal_id}' was not found"
            )));
        }

        self.fetch_required(principal_id).await
    }
}

#[cfg(test)]
mod tests;
