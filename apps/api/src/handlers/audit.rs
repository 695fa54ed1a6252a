use std::str::FromStr;

use axum::Json;
use axum::extract::{Extension, Query, State};
use praetor_application::AuditLogQuery;
use praetor_domain::{Action, AuditAction, PermissionScope, Resource};

use crate::dto::{AuditEntryResponse, AuditLogQueryRequest, parse_principal_id, parse_tenant_id};
use crate::error::ApiResult;
use crate::middleware::AdminActor;
use crate::state::AppState;

use super::authorize;

/// Lists audit entries, newest first.
///
/// Reading the whole log needs `audit_log:read@global`; a tenant-filtered
/// read is also allowed with `audit_log:read@tenant` granted for that tenant.
pub async fn list_audit_log_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Query(query): Query<AuditLogQueryRequest>,
) -> ApiResult<Json<Vec<AuditEntryResponse>>> {
    let defaults = AuditLogQuery::default();
    let query = AuditLogQuery {
        limit: query.limit.unwrap_or(defaults.limit),
        offset: query.offset.unwrap_or(defaults.offset),
        action: query
            .action
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(AuditAction::from_str)
            .transpose()?,
        actor_id: query
            .actor_id
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(parse_principal_id)
            .transpose()?,
        tenant_id: parse_tenant_id(query.tenant_id.as_deref())?,
    };

    let scope = match query.tenant_id {
        Some(_) => PermissionScope::Tenant,
        None => PermissionScope::Global,
    };
    authorize(
        &state,
        &actor,
        Resource::AuditLog,
        Action::Read,
        scope,
        query.tenant_id,
    )
    .await?;

    let entries = state
        .audit_recorder
        .list_entries(query)
        .await?
        .into_iter()
        .map(AuditEntryResponse::from)
        .collect();

    Ok(Json(entries))
}
