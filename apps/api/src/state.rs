use std::sync::Arc;

use praetor_application::{
    AccessVerifier, AuditRecorder, PrincipalService, RoleAssignmentService, RoleHierarchyService,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub role_hierarchy_service: RoleHierarchyService,
    pub role_assignment_service: RoleAssignmentService,
    pub principal_service: PrincipalService,
    pub access_verifier: AccessVerifier,
    pub audit_recorder: AuditRecorder,
    pub internal_api_token: Arc<str>,
}
