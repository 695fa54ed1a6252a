use std::sync::Arc;

use chrono::Utc;
use praetor_core::{
    AppError, AppResult, AssignmentId, IdentityClaims, PrincipalId, RoleId, TenantId,
};
use praetor_domain::{
    AdminPrincipal, AuditAction, AuditEntry, Role, RoleAssignment, SUPER_ADMIN_ROLE_NAME,
};
use serde_json::json;

use crate::{
    AuditRecorder, PrincipalRepository, PrincipalSecurityUpdate, PrincipalUpsert,
    RoleAssignmentRepository, RoleRepository,
};

/// Application service for administrative principals.
#[derive(Clone)]
pub struct PrincipalService {
    principal_repository: Arc<dyn PrincipalRepository>,
    role_repository: Arc<dyn RoleRepository>,
    assignment_repository: Arc<dyn RoleAssignmentRepository>,
    audit_recorder: AuditRecorder,
}

impl PrincipalService {
    /// Creates a new principal service.
    #[must_use]
    pub fn new(
        principal_repository: Arc<dyn PrincipalRepository>,
        role_repository: Arc<dyn RoleRepository>,
        assignment_repository: Arc<dyn RoleAssignmentRepository>,
        audit_recorder: AuditRecorder,
    ) -> Self {
        Self {
            principal_repository,
            role_repository,
            assignment_repository,
            audit_recorder,
        }
    }

    /// Creates or refreshes a principal from identity-provider claims.
    ///
    /// The super-admin flag is mirrored as a global `super_admin` assignment.
    /// An organization role is granted for the organization's tenant when a
    /// custom role of that name exists; unknown roles are skipped. Grants an
    /// earlier sync wrote for that tenant are revoked once the claims name a
    /// different organization role or none at all.
    pub async fn sync_principal(&self, claims: IdentityClaims) -> AppResult<AdminPrincipal> {
        let principal = self
            .principal_repository
            .upsert_principal(PrincipalUpsert {
                external_ref: claims.external_ref().to_owned(),
                email: claims.email().map(str::to_owned),
                is_super_admin: claims.is_super_admin(),
                login_at: Utc::now(),
            })
            .await?;

        let super_admin_change = self
            .sync_super_admin(&principal, claims.is_super_admin())
            .await?;
        let (org_grant, org_revocations) = match claims.org_id().map(TenantId::from_uuid) {
            Some(tenant_id) => {
                let (current_role, granted) = match claims.org_role() {
                    Some(org_role) => self.sync_org_role(&principal, tenant_id, org_role).await?,
                    None => (None, None),
                };
                let revoked = self
                    .revoke_stale_org_roles(&principal, tenant_id, current_role)
                    .await?;
                (granted, revoked)
            }
            None => (None, Vec::new()),
        };

        let principal = self.get_principal(principal.id).await?;

        self.audit_recorder
            .record(
                AuditEntry::new(
                    principal.id,
                    AuditAction::PrincipalSynced,
                    "admin_principal",
                    principal.id.to_string(),
                )
                .with_tenant(claims.org_id().map(TenantId::from_uuid))
                .with_details(json!({
                    "external_ref": principal.external_identity_ref,
                    "is_super_admin": principal.is_super_admin,
                    "super_admin_assignment": super_admin_change,
                    "org_role": claims.org_role(),
                    "org_role_assignment": org_grant,
                    "org_role_revocations": org_revocations,
                })),
            )
            .await;

        Ok(principal)
    }

    /// Returns a principal by id.
    pub async fn get_principal(&self, principal_id: PrincipalId) -> AppResult<AdminPrincipal> {
        self.principal_repository
            .find_principal(principal_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("principal '{principal_id}' was not found")))
    }

    /// Deactivates a principal; every later check denies.
    pub async fn deactivate_principal(
        &self,
        actor_id: PrincipalId,
        principal_id: PrincipalId,
    ) -> AppResult<AdminPrincipal> {
        self.set_active(actor_id, principal_id, false).await
    }

    /// Reactivates a principal.
    pub async fn activate_principal(
        &self,
        actor_id: PrincipalId,
        principal_id: PrincipalId,
    ) -> AppResult<AdminPrincipal> {
        self.set_active(actor_id, principal_id, true).await
    }

    /// Updates the mfa requirement and ip allow-list of a principal.
    pub async fn update_security_settings(
        &self,
        actor_id: PrincipalId,
        principal_id: PrincipalId,
        update: PrincipalSecurityUpdate,
    ) -> AppResult<AdminPrincipal> {
        let current = self.get_principal(principal_id).await?;
        let require_mfa = update.require_mfa.unwrap_or(current.require_mfa);
        let allowed_ip_ranges = update
            .allowed_ip_ranges
            .map(|ranges| ranges.into_iter().map(|range| range.trunc()).collect())
            .unwrap_or_else(|| current.allowed_ip_ranges.clone());

        let updated = self
            .principal_repository
            .update_security_settings(principal_id, require_mfa, allowed_ip_ranges)
            .await?;

        self.audit_recorder
            .record(
                AuditEntry::new(
                    actor_id,
                    AuditAction::PrincipalSecurityUpdated,
                    "admin_principal",
                    principal_id.to_string(),
                )
                .with_details(json!({
                    "require_mfa": updated.require_mfa,
                    "allowed_ip_ranges": updated
                        .allowed_ip_ranges
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>(),
                })),
            )
            .await;

        Ok(updated)
    }

    async fn set_active(
        &self,
        actor_id: PrincipalId,
        principal_id: PrincipalId,
        is_active: bool,
    ) -> AppResult<AdminPrincipal> {
        self.get_principal(principal_id).await?;
        let updated = self
            .principal_repository
            .set_active(principal_id, is_active)
            .await?;

        let action = if is_active {
            AuditAction::PrincipalActivated
        } else {
            AuditAction::PrincipalDeactivated
        };
        self.audit_recorder
            .record(AuditEntry::new(
                actor_id,
                action,
                "admin_principal",
                principal_id.to_string(),
            ))
            .await;

        Ok(updated)
    }

    async fn sync_super_admin(
        &self,
        principal: &AdminPrincipal,
        is_super_admin: bool,
    ) -> AppResult<Option<&'static str>> {
        let Some(super_admin) = self
            .role_repository
            .find_role_by_name(SUPER_ADMIN_ROLE_NAME)
            .await?
        else {
            if is_super_admin {
                tracing::warn!(
                    principal_id = %principal.id,
                    "super_admin system role is not seeded, skipping grant"
                );
            }
            return Ok(None);
        };

        if is_super_admin {
            let granted = self.ensure_assignment(principal, &super_admin, None).await?;
            return Ok(granted.then_some("granted"));
        }

        let revoked = self.revoke_synced(principal, super_admin.id, None).await?;
        if revoked {
            tracing::info!(principal_id = %principal.id, "revoked super_admin after claim change");
        }

        Ok(revoked.then_some("revoked"))
    }

    /// Grants the named organization role for `tenant_id` and returns the
    /// resolved role id alongside the grant outcome.
    async fn sync_org_role(
        &self,
        principal: &AdminPrincipal,
        tenant_id: TenantId,
        org_role: &str,
    ) -> AppResult<(Option<RoleId>, Option<&'static str>)> {
        let role = match self.role_repository.find_role_by_name(org_role).await? {
            Some(role) if !role.is_system_role => role,
            Some(_) => {
                tracing::warn!(
                    principal_id = %principal.id,
                    org_role,
                    "organization role names a system role, skipping grant"
                );
                return Ok((None, None));
            }
            None => {
                tracing::warn!(
                    principal_id = %principal.id,
                    org_role,
                    "organization role is unknown, skipping grant"
                );
                return Ok((None, None));
            }
        };

        let granted = self
            .ensure_assignment(principal, &role, Some(tenant_id))
            .await?;
        Ok((Some(role.id), granted.then_some("granted")))
    }

    /// Revokes organization grants that an earlier sync wrote for `tenant_id`
    /// and that no longer match the current organization role.
    ///
    /// Only self-granted, non-expiring assignments count as sync grants, so
    /// grants made by another administrator are left alone.
    async fn revoke_stale_org_roles(
        &self,
        principal: &AdminPrincipal,
        tenant_id: TenantId,
        current_role: Option<RoleId>,
    ) -> AppResult<Vec<RoleId>> {
        let stale = self
            .assignment_repository
            .list_assignments_for_principal(principal.id)
            .await?
            .into_iter()
            .filter(|assignment| {
                assignment.tenant_id == Some(tenant_id)
                    && assignment.granted_by_id == principal.id
                    && assignment.expires_at.is_none()
                    && Some(assignment.role_id) != current_role
            })
            .map(|assignment| assignment.role_id)
            .collect::<Vec<_>>();

        let mut revoked = Vec::with_capacity(stale.len());
        for role_id in stale {
            if self
                .revoke_synced(principal, role_id, Some(tenant_id))
                .await?
            {
                revoked.push(role_id);
            }
        }

        if !revoked.is_empty() {
            tracing::info!(
                principal_id = %principal.id,
                tenant_id = %tenant_id,
                revoked = revoked.len(),
                "revoked organization roles after claim change"
            );
        }

        Ok(revoked)
    }

    /// Returns whether a new assignment was written.
    async fn ensure_assignment(
        &self,
        principal: &AdminPrincipal,
        role: &Role,
        tenant_id: Option<TenantId>,
    ) -> AppResult<bool> {
        let result = self
            .assignment_repository
            .insert_assignment(RoleAssignment {
                id: AssignmentId::new(),
                principal_id: principal.id,
                role_id: role.id,
                tenant_id,
                granted_by_id: principal.id,
                granted_at: Utc::now(),
                expires_at: None,
            })
            .await;

        let assignment = match result {
            Ok(assignment) => assignment,
            Err(AppError::DuplicateAssignment { .. }) => return Ok(false),
            Err(error) => return Err(error),
        };

        self.audit_recorder
            .record(
                AuditEntry::new(
                    principal.id,
                    AuditAction::RoleAssigned,
                    "role_assignment",
                    assignment.id.to_string(),
                )
                .with_tenant(assignment.tenant_id)
                .with_details(json!({
                    "principal_id": assignment.principal_id,
                    "role_id": assignment.role_id,
                    "role_name": role.name.as_str(),
                    "expires_at": assignment.expires_at,
                    "source": "identity_sync",
                })),
            )
            .await;

        Ok(true)
    }

    async fn revoke_synced(
        &self,
        principal: &AdminPrincipal,
        role_id: RoleId,
        tenant_id: Option<TenantId>,
    ) -> AppResult<bool> {
        let deleted = self
            .assignment_repository
            .delete_assignment(principal.id, role_id, tenant_id)
            .await?;
        if !deleted {
            return Ok(false);
        }

        self.audit_recorder
            .record(
                AuditEntry::new(
                    principal.id,
                    AuditAction::RoleRevoked,
                    "role_assignment",
                    format!("{}:{role_id}", principal.id),
                )
                .with_tenant(tenant_id)
                .with_details(json!({
                    "principal_id": principal.id,
                    "role_id": role_id,
                    "deleted": true,
                    "source": "identity_sync",
                })),
            )
            .await;

        Ok(true)
    }
}
