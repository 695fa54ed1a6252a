use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipnet::IpNet;

use praetor_core::{AppResult, PrincipalId};
use praetor_domain::AdminPrincipal;

/// Identity-provider facts applied when a principal authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalUpsert {
    /// Provider subject reference.
    pub external_ref: String,
    /// Provider email.
    pub email: Option<String>,
    /// Provider super-admin flag.
    pub is_super_admin: bool,
    /// Authentication timestamp.
    pub login_at: DateTime<Utc>,
}

/// Partial update of a principal's security settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalSecurityUpdate {
    /// New mfa requirement, if changing.
    pub require_mfa: Option<bool>,
    /// New ip allow-list, if changing; an empty list lifts the restriction.
    pub allowed_ip_ranges: Option<Vec<IpNet>>,
}

/// Repository port for administrative principals.
#[async_trait]
pub trait PrincipalRepository: Send + Sync {
    /// Finds a principal by id.
    async fn find_principal(&self, principal_id: PrincipalId)
    -> AppResult<Option<AdminPrincipal>>;

    /// Finds a principal by identity-provider reference.
    async fn find_principal_by_external_ref(
        &self,
        external_ref: &str,
    ) -> AppResult<Option<AdminPrincipal>>;

    /// Creates or refreshes a principal keyed by external reference.
    ///
    /// New principals start active with an empty allow-list.
    async fn upsert_principal(&self, upsert: PrincipalUpsert) -> AppResult<AdminPrincipal>;

    /// Flips the active flag.
    async fn set_active(
        &self,
        principal_id: PrincipalId,
        is_active: bool,
    ) -> AppResult<AdminPrincipal>;

    /// Stores new security settings.
    async fn update_security_settings(
        &self,
        principal_id: PrincipalId,
        require_mfa: bool,
        allowed_ip_ranges: Vec<IpNet>,
    ) -> AppResult<AdminPrincipal>;
}
