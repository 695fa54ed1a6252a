use praetor_core::{AppResult, TenantId};
use praetor_domain::{Action, PermissionCheck, PermissionScope, Resource};

use crate::middleware::AdminActor;
use crate::state::AppState;

pub mod access;
pub mod assignments;
pub mod audit;
pub mod health;
pub mod principals;
pub mod roles;

/// Denies the request unless the acting admin holds a permission covering
/// `resource:action@scope` for `tenant_context`.
async fn authorize(
    state: &AppState,
    actor: &AdminActor,
    resource: Resource,
    action: Action,
    scope: PermissionScope,
    tenant_context: Option<TenantId>,
) -> AppResult<()> {
    state
        .access_verifier
        .require_permission_for(
            actor.principal_id,
            PermissionCheck::new(resource, action, scope),
            actor.context(tenant_context),
        )
        .await
        .into_result()
        .map(|_| ())
}
