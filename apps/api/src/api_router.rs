use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post, put};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

pub fn build_router(app_state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/internal/principals/{principal_id}/deactivate",
            post(handlers::principals::deactivate_principal_handler),
        )
        .route(
            "/internal/principals/{principal_id}/activate",
            post(handlers::principals::activate_principal_handler),
        )
        .route(
            "/internal/principals/{principal_id}/security",
            put(handlers::principals::update_principal_security_handler),
        )
        .route(
            "/internal/principals/{principal_id}/assignments",
            get(handlers::assignments::list_principal_assignments_handler),
        )
        .route(
            "/internal/roles",
            get(handlers::roles::list_roles_handler).post(handlers::roles::create_role_handler),
        )
        .route(
            "/internal/roles/{role_id}",
            delete(handlers::roles::delete_role_handler),
        )
        .route(
            "/internal/roles/{role_id}/ancestors",
            get(handlers::roles::role_ancestors_handler),
        )
        .route(
            "/internal/roles/{role_id}/parent",
            put(handlers::roles::set_role_parent_handler),
        )
        .route(
            "/internal/roles/{role_id}/permissions",
            put(handlers::roles::set_role_permissions_handler),
        )
        .route(
            "/internal/assignments",
            post(handlers::assignments::assign_role_handler),
        )
        .route(
            "/internal/assignments/revoke",
            post(handlers::assignments::revoke_role_handler),
        )
        .route(
            "/internal/audit-log",
            get(handlers::audit::list_audit_log_handler),
        )
        .route_layer(from_fn(middleware::require_admin_actor));

    // Service-to-service routes; the bearer token is the only credential.
    let internal_routes = Router::new()
        .route(
            "/internal/principals/sync",
            post(handlers::principals::sync_principal_handler),
        )
        .route(
            "/internal/access/permission",
            post(handlers::access::check_permission_handler),
        )
        .route(
            "/internal/access/role",
            post(handlers::access::check_role_handler),
        )
        .merge(admin_routes)
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_internal_token,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(internal_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
