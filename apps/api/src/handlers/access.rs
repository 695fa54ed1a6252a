use std::net::IpAddr;
use std::str::FromStr;

use axum::Json;
use axum::extract::State;
use praetor_application::AccessContext;
use praetor_core::{AppError, AppResult};
use praetor_domain::{Action, PermissionCheck, PermissionScope, Resource};

use crate::dto::{
    AccessDecisionResponse, PermissionCheckRequest, RoleCheckRequest, parse_principal_id,
    parse_tenant_id,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// Verifies a permission for a principal on behalf of a calling service.
///
/// Denials surface as 401 or 403 without naming the reason; the reason is in
/// the audit log.
pub async fn check_permission_handler(
    State(state): State<AppState>,
    Json(payload): Json<PermissionCheckRequest>,
) -> ApiResult<Json<AccessDecisionResponse>> {
    let principal_id = parse_principal_id(payload.principal_id.as_str())?;
    let check = PermissionCheck::new(
        Resource::from_str(payload.resource.as_str())?,
        Action::from_str(payload.action.as_str())?,
        PermissionScope::from_str(payload.scope.as_str())?,
    );
    let context = AccessContext {
        tenant_context: parse_tenant_id(payload.tenant_id.as_deref())?,
        client_ip: parse_client_ip(payload.client_ip.as_deref())?,
    };

    let matched = state
        .access_verifier
        .require_permission_for(principal_id, check, context)
        .await
        .into_result()?;

    Ok(Json(AccessDecisionResponse {
        allowed: true,
        matched,
    }))
}

/// Verifies that a principal holds a named role.
pub async fn check_role_handler(
    State(state): State<AppState>,
    Json(payload): Json<RoleCheckRequest>,
) -> ApiResult<Json<AccessDecisionResponse>> {
    let principal_id = parse_principal_id(payload.principal_id.as_str())?;
    let context = AccessContext {
        tenant_context: parse_tenant_id(payload.tenant_id.as_deref())?,
        client_ip: parse_client_ip(payload.client_ip.as_deref())?,
    };

    let matched = state
        .access_verifier
        .require_role_for(
            principal_id,
            payload.role_name.as_str(),
            context,
            payload.include_ancestors,
        )
        .await
        .into_result()?;

    Ok(Json(AccessDecisionResponse {
        allowed: true,
        matched,
    }))
}

fn parse_client_ip(value: Option<&str>) -> AppResult<Option<IpAddr>> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            IpAddr::from_str(value)
                .map_err(|_| AppError::Validation(format!("invalid client ip '{value}'")))
        })
        .transpose()
}
