use axum::Json;
use axum::extract::{Extension, Path, State};
use praetor_application::PrincipalSecurityUpdate;
use praetor_core::{AppResult, IdentityClaims};
use praetor_domain::{Action, PermissionScope, Resource, parse_ip_ranges};

use crate::dto::{
    PrincipalResponse, SyncPrincipalRequest, UpdatePrincipalSecurityRequest, parse_principal_id,
};
use crate::error::ApiResult;
use crate::middleware::AdminActor;
use crate::state::AppState;

use super::authorize;

/// Upserts a principal from identity-provider claims. Trusted by token alone.
pub async fn sync_principal_handler(
    State(state): State<AppState>,
    Json(payload): Json<SyncPrincipalRequest>,
) -> ApiResult<Json<PrincipalResponse>> {
    let claims = IdentityClaims::new(
        payload.external_ref,
        payload.email,
        payload.is_super_admin,
        payload.org_id,
        payload.org_role,
    )?;
    let principal = state.principal_service.sync_principal(claims).await?;

    Ok(Json(PrincipalResponse::from(principal)))
}

pub async fn deactivate_principal_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Path(principal_id): Path<String>,
) -> ApiResult<Json<PrincipalResponse>> {
    let principal_id = parse_principal_id(principal_id.as_str())?;
    authorize_principal_admin(&state, &actor).await?;

    let principal = state
        .principal_service
        .deactivate_principal(actor.principal_id, principal_id)
        .await?;

    Ok(Json(PrincipalResponse::from(principal)))
}

pub async fn activate_principal_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Path(principal_id): Path<String>,
) -> ApiResult<Json<PrincipalResponse>> {
    let principal_id = parse_principal_id(principal_id.as_str())?;
    authorize_principal_admin(&state, &actor).await?;

    let principal = state
        .principal_service
        .activate_principal(actor.principal_id, principal_id)
        .await?;

    Ok(Json(PrincipalResponse::from(principal)))
}

pub async fn update_principal_security_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Path(principal_id): Path<String>,
    Json(payload): Json<UpdatePrincipalSecurityRequest>,
) -> ApiResult<Json<PrincipalResponse>> {
    let principal_id = parse_principal_id(principal_id.as_str())?;
    authorize_principal_admin(&state, &actor).await?;

    let allowed_ip_ranges = payload
        .allowed_ip_ranges
        .map(parse_ip_ranges)
        .transpose()?;

    let principal = state
        .principal_service
        .update_security_settings(
            actor.principal_id,
            principal_id,
            PrincipalSecurityUpdate {
                require_mfa: payload.require_mfa,
                allowed_ip_ranges,
            },
        )
        .await?;

    Ok(Json(PrincipalResponse::from(principal)))
}

async fn authorize_principal_admin(state: &AppState, actor: &AdminActor) -> AppResult<()> {
    authorize(
        state,
        actor,
        Resource::AdminUser,
        Action::Manage,
        PermissionScope::Global,
        None,
    )
    .await
}
