use std::net::IpAddr;
use std::sync::Arc;

use praetor_core::{PrincipalId, TenantId};
use praetor_domain::{
    AdminPrincipal, AuditAction, AuditEntry, Decision, DecisionMatch, DenyReason, PermissionCheck,
};
use serde_json::json;

use crate::{AuditRecorder, EngineConfig, PermissionResolver, PrincipalRepository};

/// Request facts a check is evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessContext {
    /// Tenant the guarded operation targets.
    pub tenant_context: Option<TenantId>,
    /// Caller address as seen by the api boundary.
    pub client_ip: Option<IpAddr>,
}

/// What a check asked for; only used for logging and audit.
enum Requirement<'a> {
    Permission(PermissionCheck),
    Role {
        name: &'a str,
        include_ancestors: bool,
    },
}

impl Requirement<'_> {
    fn target_type(&self) -> &'static str {
        match self {
            Self::Permission(_) => "permission",
            Self::Role { .. } => "role",
        }
    }

    fn target_id(&self) -> String {
        match self {
            Self::Permission(check) => check.to_string(),
            Self::Role { name, .. } => (*name).to_owned(),
        }
    }
}

/// Turns principals and requirements into allow/deny decisions.
///
/// Checks run in a fixed order and stop at the first failure: account
/// state, caller address, then resolution. Any resolution error denies.
#[derive(Clone)]
pub struct AccessVerifier {
    principal_repository: Arc<dyn PrincipalRepository>,
    resolver: PermissionResolver,
    audit_recorder: AuditRecorder,
    config: EngineConfig,
}

impl AccessVerifier {
    /// Creates a new access verifier.
    #[must_use]
    pub fn new(
        principal_repository: Arc<dyn PrincipalRepository>,
        resolver: PermissionResolver,
        audit_recorder: AuditRecorder,
        config: EngineConfig,
    ) -> Self {
        Self {
            principal_repository,
            resolver,
            audit_recorder,
            config,
        }
    }

    /// Decides whether the principal holds a permission covering `check`.
    pub async fn require_permission(
        &self,
        principal: &AdminPrincipal,
        check: PermissionCheck,
        context: AccessContext,
    ) -> Decision {
        let decision = match self.gate(principal, context) {
            Some(reason) => Decision::deny(reason),
            None => match self
                .resolver
                .resolve_for_principal(principal, context.tenant_context)
                .await
            {
                Ok(resolved) => match resolved.find_grant(&check) {
                    Some(grant) => Decision::allow(DecisionMatch::Permission {
                        permission: grant.permission,
                        role_id: grant.role_id,
                        assignment_id: grant.assignment_id,
                        grant_tenant: grant.grant_tenant,
                    }),
                    None => Decision::deny(DenyReason::MissingPermission),
                },
                Err(error) => {
                    tracing::error!(
                        principal_id = %principal.id,
                        error = %error,
                        "permission resolution failed, denying"
                    );
                    Decision::deny(DenyReason::ResolutionFailed)
                }
            },
        };

        self.finish(principal.id, Requirement::Permission(check), context, decision)
            .await
    }

    /// Decides whether the principal holds the named role.
    ///
    /// Only role identity counts. With `include_ancestors`, holding a role
    /// that inherits from the named role also matches; overlapping permission
    /// sets never do.
    pub async fn require_role(
        &self,
        principal: &AdminPrincipal,
        role_name: &str,
        context: AccessContext,
        include_ancestors: bool,
    ) -> Decision {
        let role_name = role_name.trim();
        let decision = match self.gate(principal, context) {
            Some(reason) => Decision::deny(reason),
            None => match self
                .resolver
                .resolve_for_principal(principal, context.tenant_context)
                .await
            {
                Ok(resolved) => match resolved.find_role(role_name, include_ancestors) {
                    Some(role) => Decision::allow(DecisionMatch::Role {
                        role_id: role.role_id,
                        role_name: role.role_name.clone(),
                        assignment_id: role.assignment_id,
                        inherited: role.inherited,
                    }),
                    None => Decision::deny(DenyReason::MissingRole),
                },
                Err(error) => {
                    tracing::error!(
                        principal_id = %principal.id,
                        error = %error,
                        "role resolution failed, denying"
                    );
                    Decision::deny(DenyReason::ResolutionFailed)
                }
            },
        };

        let requirement = Requirement::Role {
            name: role_name,
            include_ancestors,
        };
        self.finish(principal.id, requirement, context, decision)
            .await
    }

    /// Loads the principal and runs [`Self::require_permission`].
    pub async fn require_permission_for(
        &self,
        principal_id: PrincipalId,
        check: PermissionCheck,
        context: AccessContext,
    ) -> Decision {
        match self.load_principal(principal_id).await {
            Ok(principal) => self.require_permission(&principal, check, context).await,
            Err(reason) => {
                self.finish(
                    principal_id,
                    Requirement::Permission(check),
                    context,
                    Decision::deny(reason),
                )
                .await
            }
        }
    }

    /// Loads the principal and runs [`Self::require_role`].
    pub async fn require_role_for(
        &self,
        principal_id: PrincipalId,
        role_name: &str,
        context: AccessContext,
        include_ancestors: bool,
    ) -> Decision {
        match self.load_principal(principal_id).await {
            Ok(principal) => {
                self.require_role(&principal, role_name, context, include_ancestors)
                    .await
            }
            Err(reason) => {
                let requirement = Requirement::Role {
                    name: role_name.trim(),
                    include_ancestors,
                };
                self.finish(principal_id, requirement, context, Decision::deny(reason))
                    .await
            }
        }
    }

    fn gate(&self, principal: &AdminPrincipal, context: AccessContext) -> Option<DenyReason> {
        if !principal.is_active {
            return Some(DenyReason::InactiveAccount);
        }

        if !principal.allows_ip(context.client_ip) {
            return Some(DenyReason::IpNotAllowed);
        }

        None
    }

    async fn load_principal(&self, principal_id: PrincipalId) -> Result<AdminPrincipal, DenyReason> {
        match self.principal_repository.find_principal(principal_id).await {
            Ok(Some(principal)) => Ok(principal),
            Ok(None) => Err(DenyReason::PrincipalNotFound),
            Err(error) => {
                tracing::error!(
                    principal_id = %principal_id,
                    error = %error,
                    "principal lookup failed, denying"
                );
                Err(DenyReason::ResolutionFailed)
            }
        }
    }

    async fn finish(
        &self,
        principal_id: PrincipalId,
        requirement: Requirement<'_>,
        context: AccessContext,
        decision: Decision,
    ) -> Decision {
        let include_ancestors = match requirement {
            Requirement::Role {
                include_ancestors, ..
            } => Some(include_ancestors),
            Requirement::Permission(_) => None,
        };

        let entry = match decision.deny_reason {
            Some(reason) => {
                tracing::warn!(
                    principal_id = %principal_id,
                    target_type = requirement.target_type(),
                    target = %requirement.target_id(),
                    reason = reason.as_str(),
                    "access denied"
                );

                AuditEntry::new(
                    principal_id,
                    AuditAction::AccessDenied,
                    requirement.target_type(),
                    requirement.target_id(),
                )
                .with_details(json!({
                    "reason": reason.as_str(),
                    "include_ancestors": include_ancestors,
                }))
            }
            None if self.config.audit_successful_checks => AuditEntry::new(
                principal_id,
                AuditAction::AccessGranted,
                requirement.target_type(),
                requirement.target_id(),
            )
            .with_details(json!({
                "matched": decision.matched,
                "include_ancestors": include_ancestors,
            })),
            None => return decision,
        };

        self.audit_recorder
            .record(
                entry
                    .with_tenant(context.tenant_context)
                    .with_ip_address(context.client_ip),
            )
            .await;

        decision
    }
}
