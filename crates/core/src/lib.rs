//! Shared primitives for all Rust crates in Praetor.

#![forbid(unsafe_code)]

/// Identity-provider claims shared across services.
pub mod auth;
mod ids;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::IdentityClaims;
pub use ids::{AssignmentId, AuditEntryId, PrincipalId, RoleId, TenantId};

/// Result type used across Praetor crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Hierarchy edit rejected because it would introduce a cycle.
    #[error("cyclic hierarchy: role '{role_id}' cannot take '{parent_id}' as parent")]
    CyclicHierarchy {
        /// Role being re-parented.
        role_id: RoleId,
        /// Rejected parent.
        parent_id: RoleId,
    },

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The `(principal, role, tenant)` grant already exists.
    #[error(
        "duplicate assignment: role '{role_id}' is already granted to principal '{principal_id}' in scope '{}'",
        scope_label(.tenant_id)
    )]
    DuplicateAssignment {
        /// Grantee principal.
        principal_id: PrincipalId,
        /// Granted role.
        role_id: RoleId,
        /// Tenant scope of the grant, `None` for global.
        tenant_id: Option<TenantId>,
    },

    /// User is not authenticated or not allowed to access a resource.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Transport-independent grouping of [`AppError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller input was rejected.
    Validation,
    /// Referenced entity is unknown.
    NotFound,
    /// Write collided with existing state.
    Conflict,
    /// Caller identity missing or inactive.
    Unauthorized,
    /// Caller lacks the required grant.
    Forbidden,
    /// Unexpected failure.
    Internal,
}

impl AppError {
    /// Returns the category used by transport layers to pick a status.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::CyclicHierarchy { .. } => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) | Self::DuplicateAssignment { .. } => ErrorKind::Conflict,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Renders an optional tenant as a human-readable grant scope.
#[must_use]
pub fn scope_label(tenant_id: &Option<TenantId>) -> String {
    match tenant_id {
        Some(tenant_id) => format!("tenant:{tenant_id}"),
        None => "global".to_owned(),
    }
}
