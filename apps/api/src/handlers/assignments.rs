use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use praetor_application::{AssignRoleInput, RevokeRoleInput};
use praetor_core::AppResult;
use praetor_domain::{Action, PermissionScope, Resource};

use crate::dto::{
    AssignRoleRequest, AssignedRoleResponse, AssignmentListQuery, RevokeRoleRequest,
    RevokeRoleResponse, RoleAssignmentResponse, parse_principal_id, parse_role_id,
    parse_tenant_id,
};
use crate::error::ApiResult;
use crate::middleware::AdminActor;
use crate::state::AppState;

use super::authorize;

pub async fn assign_role_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Json(payload): Json<AssignRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleAssignmentResponse>)> {
    let input = AssignRoleInput {
        principal_id: parse_principal_id(payload.principal_id.as_str())?,
        role_id: parse_role_id(payload.role_id.as_str())?,
        tenant_id: parse_tenant_id(payload.tenant_id.as_deref())?,
        granted_by_id: actor.principal_id,
        expires_at: payload.expires_at,
    };
    authorize_assignments(&state, &actor, Action::Manage).await?;

    let assignment = state.role_assignment_service.assign_role(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(RoleAssignmentResponse::from(assignment)),
    ))
}

pub async fn revoke_role_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Json(payload): Json<RevokeRoleRequest>,
) -> ApiResult<Json<RevokeRoleResponse>> {
    let input = RevokeRoleInput {
        principal_id: parse_principal_id(payload.principal_id.as_str())?,
        role_id: parse_role_id(payload.role_id.as_str())?,
        tenant_id: parse_tenant_id(payload.tenant_id.as_deref())?,
        revoked_by_id: actor.principal_id,
    };
    authorize_assignments(&state, &actor, Action::Manage).await?;

    let revoked = state.role_assignment_service.revoke_role(input).await?;

    Ok(Json(RevokeRoleResponse { revoked }))
}

pub async fn list_principal_assignments_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Path(principal_id): Path<String>,
    Query(query): Query<AssignmentListQuery>,
) -> ApiResult<Json<Vec<AssignedRoleResponse>>> {
    let principal_id = parse_principal_id(principal_id.as_str())?;
    let tenant_id = parse_tenant_id(query.tenant_id.as_deref())?;
    authorize_assignments(&state, &actor, Action::Read).await?;

    let assignments = state
        .role_assignment_service
        .list_assignments(principal_id, tenant_id)
        .await?
        .into_iter()
        .map(AssignedRoleResponse::from)
        .collect();

    Ok(Json(assignments))
}

async fn authorize_assignments(
    state: &AppState,
    actor: &AdminActor,
    action: Action,
) -> AppResult<()> {
    authorize(
        state,
        actor,
        Resource::Role,
        action,
        PermissionScope::Global,
        None,
    )
    .await
}
