use std::sync::Arc;

use praetor_application::{
    AccessVerifier, AuditRecorder, PermissionResolver, PrincipalService, RoleAssignmentService,
    RoleHierarchyService,
};
use praetor_core::{AppError, AppResult};

use crate::api_config::ApiConfig;
use crate::state::AppState;

mod caches;
mod repositories;

pub use repositories::RepositorySet;

pub fn build_app_state(repositories: RepositorySet, config: &ApiConfig) -> AppResult<AppState> {
    let redis_client = config
        .redis_url
        .as_deref()
        .map(|redis_url| {
            redis::Client::open(redis_url)
                .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))
        })
        .transpose()?;
    let permission_cache = caches::build_permission_cache(config, redis_client);

    let audit_recorder = AuditRecorder::new(repositories.audit_repository.clone());
    let resolver = PermissionResolver::new(
        repositories.principal_repository.clone(),
        repositories.assignment_repository.clone(),
        repositories.role_repository.clone(),
        config.engine,
    )
    .with_cache(permission_cache);

    Ok(AppState {
        role_hierarchy_service: RoleHierarchyService::new(
            repositories.role_repository.clone(),
            audit_recorder.clone(),
            config.engine,
        ),
        role_assignment_service: RoleAssignmentService::new(
            repositories.assignment_repository.clone(),
            repositories.role_repository.clone(),
            repositories.principal_repository.clone(),
            audit_recorder.clone(),
            config.engine,
        ),
        principal_service: PrincipalService::new(
            repositories.principal_repository.clone(),
            repositories.role_repository,
            repositories.assignment_repository,
            audit_recorder.clone(),
        ),
        access_verifier: AccessVerifier::new(
            repositories.principal_repository,
            resolver,
            audit_recorder.clone(),
            config.engine,
        ),
        audit_recorder,
        internal_api_token: Arc::from(config.internal_api_token.as_str()),
    })
}
