use praetor_core::{AppError, AppResult, AssignmentId, RoleId, TenantId};
use serde::{Deserialize, Serialize};

use crate::{Permission, RoleName};

/// Why a verification check denied access.
///
/// Only ever written to internal logs and the audit trail; clients see a
/// generic denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// The principal does not exist.
    PrincipalNotFound,
    /// The principal is deactivated.
    InactiveAccount,
    /// The caller address is outside the principal's allow-list.
    IpNotAllowed,
    /// No resolved permission covers the check.
    MissingPermission,
    /// The principal does not hold the role, directly or by inheritance.
    MissingRole,
    /// Resolution failed; the engine fails closed.
    ResolutionFailed,
}

impl DenyReason {
    /// Returns a stable log value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrincipalNotFound => "PRINCIPAL_NOT_FOUND",
            Self::InactiveAccount => "INACTIVE_ACCOUNT",
            Self::IpNotAllowed => "IP_NOT_ALLOWED",
            Self::MissingPermission => "MISSING_PERMISSION",
            Self::MissingRole => "MISSING_ROLE",
            Self::ResolutionFailed => "RESOLUTION_FAILED",
        }
    }

    /// Returns whether the denial concerns the caller's identity rather than
    /// its grants.
    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::PrincipalNotFound | Self::InactiveAccount)
    }
}

/// What satisfied an allowed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionMatch {
    /// A resolved permission covered the check.
    Permission {
        /// Matching permission.
        permission: Permission,
        /// Role that carries the permission.
        role_id: RoleId,
        /// Assignment through which the role was reached.
        assignment_id: AssignmentId,
        /// Tenant the assignment is scoped to.
        grant_tenant: Option<TenantId>,
    },
    /// The principal holds the role, directly or through an assigned descendant.
    Role {
        /// Matching role.
        role_id: RoleId,
        /// Matching role name.
        role_name: RoleName,
        /// Assignment through which the role was reached.
        assignment_id: AssignmentId,
        /// Whether the role was reached through the hierarchy.
        inherited: bool,
    },
}

/// Outcome of one verification check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether access is allowed.
    pub allowed: bool,
    /// What satisfied the check, when allowed.
    pub matched: Option<DecisionMatch>,
    /// Typed reason, when denied.
    pub deny_reason: Option<DenyReason>,
}

impl Decision {
    /// Creates an allowing decision.
    #[must_use]
    pub fn allow(matched: DecisionMatch) -> Self {
        Self {
            allowed: true,
            matched: Some(matched),
            deny_reason: None,
        }
    }

    /// Creates a denying decision.
    #[must_use]
    pub fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            matched: None,
            deny_reason: Some(reason),
        }
    }

    /// Converts the decision into a client-safe result.
    ///
    /// Identity problems become `Unauthorized`, everything else `Forbidden`;
    /// neither message names the reason.
    pub fn into_result(self) -> AppResult<DecisionMatch> {
        match (self.allowed, self.matched, self.deny_reason) {
            (true, Some(matched), _) => Ok(matched),
            (_, _, Some(reason)) if reason.is_unauthenticated() => Err(AppError::Unauthorized(
                "authentication required".to_owned(),
            )),
            _ => Err(AppError::Forbidden("access denied".to_owned())),
        }
    }
}
