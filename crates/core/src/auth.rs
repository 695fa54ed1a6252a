use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppResult, NonEmptyString};

/// Claims delivered by the external identity provider on authentication.
///
/// The engine never calls the provider; it only consumes these claims when
/// creating or refreshing an administrative principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    external_ref: NonEmptyString,
    email: Option<String>,
    is_super_admin: bool,
    org_id: Option<Uuid>,
    org_role: Option<String>,
}

impl IdentityClaims {
    /// Creates validated identity claims.
    pub fn new(
        external_ref: impl Into<String>,
        email: Option<String>,
        is_super_admin: bool,
        org_id: Option<Uuid>,
        org_role: Option<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            external_ref: NonEmptyString::new(external_ref)?,
            email: email.filter(|value| !value.trim().is_empty()),
            is_super_admin,
            org_id,
            org_role: org_role
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
        })
    }

    /// Returns the stable subject reference from the identity provider.
    #[must_use]
    pub fn external_ref(&self) -> &str {
        self.external_ref.as_str()
    }

    /// Returns the email, if the provider returned one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns whether the provider flags the subject as a super administrator.
    #[must_use]
    pub fn is_super_admin(&self) -> bool {
        self.is_super_admin
    }

    /// Returns the organization the subject authenticated for.
    #[must_use]
    pub fn org_id(&self) -> Option<Uuid> {
        self.org_id
    }

    /// Returns the base role claim for the organization.
    #[must_use]
    pub fn org_role(&self) -> Option<&str> {
        self.org_role.as_deref()
    }
}
