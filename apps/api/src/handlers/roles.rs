use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use praetor_application::CreateRoleInput;
use praetor_core::AppResult;
use praetor_domain::{Action, Permission, PermissionScope, Resource};

use crate::dto::{
    CreateRoleRequest, RoleResponse, SetRoleParentRequest, SetRolePermissionsRequest,
    parse_role_id,
};
use crate::error::ApiResult;
use crate::middleware::AdminActor;
use crate::state::AppState;

use super::authorize;

pub async fn list_roles_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
) -> ApiResult<Json<Vec<RoleResponse>>> {
    authorize_roles(&state, &actor, Action::Read).await?;

    let roles = state
        .role_hierarchy_service
        .list_roles()
        .await?
        .into_iter()
        .map(RoleResponse::from)
        .collect();

    Ok(Json(roles))
}

pub async fn create_role_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleResponse>)> {
    authorize_roles(&state, &actor, Action::Manage).await?;

    let parent_role_id = payload
        .parent_role_id
        .as_deref()
        .map(parse_role_id)
        .transpose()?;
    let role = state
        .role_hierarchy_service
        .create_role(
            actor.principal_id,
            CreateRoleInput {
                name: payload.name,
                description: payload.description,
                parent_role_id,
                permissions: parse_permissions(&payload.permissions)?,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(RoleResponse::from(role))))
}

/// Returns the strict ancestors of a role, nearest first.
pub async fn role_ancestors_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Path(role_id): Path<String>,
) -> ApiResult<Json<Vec<RoleResponse>>> {
    let role_id = parse_role_id(role_id.as_str())?;
    authorize_roles(&state, &actor, Action::Read).await?;

    let ancestors = state
        .role_hierarchy_service
        .ancestors(role_id)
        .await?
        .into_iter()
        .map(RoleResponse::from)
        .collect();

    Ok(Json(ancestors))
}

pub async fn set_role_parent_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Path(role_id): Path<String>,
    Json(payload): Json<SetRoleParentRequest>,
) -> ApiResult<Json<RoleResponse>> {
    let role_id = parse_role_id(role_id.as_str())?;
    let parent_role_id = payload
        .parent_role_id
        .as_deref()
        .map(parse_role_id)
        .transpose()?;
    authorize_roles(&state, &actor, Action::Manage).await?;

    let role = state
        .role_hierarchy_service
        .set_parent(actor.principal_id, role_id, parent_role_id)
        .await?;

    Ok(Json(RoleResponse::from(role)))
}

pub async fn set_role_permissions_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Path(role_id): Path<String>,
    Json(payload): Json<SetRolePermissionsRequest>,
) -> ApiResult<Json<RoleResponse>> {
    let role_id = parse_role_id(role_id.as_str())?;
    let permissions = parse_permissions(&payload.permissions)?;
    authorize_roles(&state, &actor, Action::Manage).await?;

    let role = state
        .role_hierarchy_service
        .set_role_permissions(actor.principal_id, role_id, permissions)
        .await?;

    Ok(Json(RoleResponse::from(role)))
}

pub async fn delete_role_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Path(role_id): Path<String>,
) -> ApiResult<StatusCode> {
    let role_id = parse_role_id(role_id.as_str())?;
    authorize_roles(&state, &actor, Action::Manage).await?;

    state
        .role_hierarchy_service
        .delete_role(actor.principal_id, role_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

fn parse_permissions(values: &[String]) -> AppResult<Vec<Permission>> {
    values
        .iter()
        .map(|value| Permission::from_transport(value.as_str()))
        .collect()
}

async fn authorize_roles(state: &AppState, actor: &AdminActor, action: Action) -> AppResult<()> {
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
