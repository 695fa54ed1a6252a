use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use praetor_application::RoleRepository;
use praetor_core::{AppError, AppResult, RoleId};
use praetor_domain::{Permission, Role, RoleGraph};

use crate::postgres_rbac_support::{
    begin_serializable, bump_versions_for_roles, commit, fetch_live_roles, is_unique_violation,
    map_write_error,
};

/// PostgreSQL-backed role and hierarchy repository.
///
/// Every hierarchy write runs in a SERIALIZABLE transaction and re-checks the
/// chain after the write, so concurrent edits cannot commit a cycle.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        fetch_live_roles(&self.pool, None, None).await
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(fetch_live_roles(&self.pool, Some(role_id), None)
            .await?
            .into_iter()
            .next())
    }

    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        Ok(fetch_live_roles(&self.pool, None, Some(name))
            .await?
            .into_iter()
            .next())
    }

    async fn insert_role(&self, role: Role) -> AppResult<Role> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        sqlx::query(
            r#"
            INSERT INTO admin_roles (id, name, description, is_system_role, parent_role_id, version)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.name.as_str())
        .bind(role.description.as_str())
        .bind(role.is_system_role)
        .bind(role.parent_role_id.map(|parent_id| parent_id.as_uuid()))
        .bind(role.version)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                return AppError::Conflict(format!("role '{}' already exists", role.name));
            }

            AppError::Internal(format!("failed to create role '{}': {error}", role.name))
        })?;

        replace_permissions(&mut transaction, role.id, &role.permissions).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(role)
    }

    async fn update_parent(
        &self,
        role_id: RoleId,
        parent_role_id: Option<RoleId>,
        expected_version: i64,
        max_depth: usize,
    ) -> AppResult<Role> {
        let mut transaction = begin_serializable(&self.pool).await?;

        if let Some(parent_role_id) = parent_role_id
            && fetch_live_roles(&mut *transaction, Some(parent_role_id), None)
                .await?
                .is_empty()
        {
            return Err(AppError::NotFound(format!(
                "parent role '{parent_role_id}' was not found"
            )));
        }

        let updated = sqlx::query(
            r#"
            UPDATE admin_roles
            SET parent_role_id = $2,
                version = version + 1,
                updated_at = now()
            WHERE id = $1
                AND version = $3
                AND deleted_at IS NULL
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(parent_role_id.map(|parent_id| parent_id.as_uuid()))
        .bind(expected_version)
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_write_error(error, "failed to update role parent"))?;
        ensure_single_row(updated.rows_affected(), role_id)?;

        let role = revalidate_and_bump(&mut transaction, role_id, max_depth).await?;
        commit(transaction).await?;

        Ok(role)
    }

    async fn update_permissions(
        &self,
        role_id: RoleId,
        permissions: BTreeSet<Permission>,
        expected_version: i64,
        max_depth: usize,
    ) -> AppResult<Role> {
        let mut transaction = begin_serializable(&self.pool).await?;

        let updated = sqlx::query(
            r#"
            UPDATE admin_roles
            SET version = version + 1,
                updated_at = now()
            WHERE id = $1
                AND version = $2
                AND deleted_at IS NULL
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(expected_version)
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_write_error(error, "failed to update role"))?;
        ensure_single_row(updated.rows_affected(), role_id)?;

        replace_permissions(&mut transaction, role_id, &permissions).await?;

        let role = revalidate_and_bump(&mut transaction, role_id, max_depth).await?;
        commit(transaction).await?;

        Ok(role)
    }

    async fn soft_delete_role(
        &self,
        role_id: RoleId,
        expected_version: i64,
        max_depth: usize,
    ) -> AppResult<()> {
        let mut transaction = begin_serializable(&self.pool).await?;

        let graph = RoleGraph::new(
            fetch_live_roles(&mut *transaction, None, None).await?,
            max_depth,
        );
        let mut affected = graph.descendants(role_id);
        affected.push(role_id);

        let deleted = sqlx::query(
            r#"
            UPDATE admin_roles
            SET deleted_at = now(),
                version = version + 1,
                updated_at = now()
            WHERE id = $1
                AND version = $2
                AND deleted_at IS NULL
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(expected_version)
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_write_error(error, "failed to delete role"))?;
        ensure_single_row(deleted.rows_affected(), role_id)?;

        sqlx::query(
            r#"
            UPDATE admin_roles
            SET parent_role_id = NULL,
                version = version + 1,
                updated_at = now()
            WHERE parent_role_id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_write_error(error, "failed to detach child roles"))?;

        let remaining = RoleGraph::new(
            fetch_live_roles(&mut *transaction, None, None).await?,
            max_depth,
        );
        reject_tenant_only_global_grants(&mut transaction, &remaining, &affected).await?;

        let bumped = bump_versions_for_roles(&mut transaction, &affected).await?;
        commit(transaction).await?;

        tracing::info!(role_id = %role_id, principals = bumped, "soft-deleted role");
        Ok(())
    }
}

async fn replace_permissions(
    transaction: &mut Transaction<'_, Postgres>,
    role_id: RoleId,
    permissions: &BTreeSet<Permission>,
) -> AppResult<()> {
    sqlx::query("DELETE FROM admin_role_permissions WHERE role_id = $1")
        .bind(role_id.as_uuid())
        .execute(&mut **transaction)
        .await
        .map_err(|error| map_write_error(error, "failed to clear role permissions"))?;

    let permission_ids = permissions.iter().map(Permission::id).collect::<Vec<_>>();
    sqlx::query(
        r#"
        INSERT INTO admin_role_permissions (role_id, permission)
        SELECT $1, permission
        FROM UNNEST($2::TEXT[]) AS permission
        "#,
    )
    .bind(role_id.as_uuid())
    .bind(permission_ids)
    .execute(&mut **transaction)
    .await
    .map_err(|error| map_write_error(error, "failed to persist role permissions"))?;

    Ok(())
}

/// Re-reads the hierarchy inside the write transaction, rejects a cycle or an
/// over-deep chain, and bumps the versions of every affected principal.
async fn revalidate_and_bump(
    transaction: &mut Transaction<'_, Postgres>,
    role_id: RoleId,
    max_depth: usize,
) -> AppResult<Role> {
    let graph = RoleGraph::new(
        fetch_live_roles(&mut **transaction, None, None).await?,
        max_depth,
    );
    graph.revalidate_chain(role_id)?;

    let mut affected = graph.descendants(role_id);
    affected.push(role_id);
    reject_tenant_only_global_grants(transaction, &graph, &affected).await?;
    bump_versions_for_roles(transaction, &affected).await?;

    graph
        .role(role_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))
}

/// Fails when an edited role, now tenant-only in `graph`, still has an
/// assignment without a tenant. Runs before commit so the edit rolls back.
async fn reject_tenant_only_global_grants(
    transaction: &mut Transaction<'_, Postgres>,
    graph: &RoleGraph,
    role_ids: &[RoleId],
) -> AppResult<()> {
    let tenant_only = graph.tenant_only_roles(role_ids.iter().copied())?;
    if tenant_only.is_empty() {
        return Ok(());
    }

    let globally_assigned = sqlx::query_scalar::<_, uuid::Uuid>(
        r#"
        SELECT DISTINCT role_id
        FROM admin_role_assignments
        WHERE role_id = ANY($1)
            AND tenant_id IS NULL
        "#,
    )
    .bind(
        tenant_only
            .iter()
            .map(|role_id| role_id.as_uuid())
            .collect::<Vec<_>>(),
    )
    .fetch_all(&mut **transaction)
    .await
    .map_err(|error| map_write_error(error, "failed to check global role assignments"))?
    .into_iter()
    .map(RoleId::from_uuid)
    .collect::<BTreeSet<_>>();

    graph.ensure_global_grants_allowed(tenant_only, |role_id| {
        globally_assigned.contains(&role_id)
    })
}

fn ensure_single_row(rows_affected: u64, role_id: RoleId) -> AppResult<()> {
    if rows_affected == 0 {
        return Err(AppError::Conflict(format!(
            "role '{role_id}' was modified concurrently or no longer exists"
        )));
    }

    Ok(())
}
