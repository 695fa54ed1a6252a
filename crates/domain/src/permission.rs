//! Closed permission catalog and the scope containment rule.
//!
//! Every permission that can reach a decision is a `(resource, action, scope)`
//! triple listed in [`Permission::catalog`]. Storage and transport values are
//! parsed back through the catalog, so an unknown string is rejected instead
//! of silently matching nothing (or everything).

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use praetor_core::{AppError, TenantId};
use serde::{Deserialize, Serialize};

/// Resources guarded by the administrative console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Customer orders.
    Order,
    /// Catalog products.
    Product,
    /// Tenant (merchant) records.
    Tenant,
    /// Storefront configuration.
    Storefront,
    /// Shipping provider settings.
    Shipping,
    /// Payment settings and payouts.
    Payment,
    /// Outbound webhook subscriptions.
    Webhook,
    /// Notification templates and channels.
    Notification,
    /// Administrative principals.
    AdminUser,
    /// Roles and role assignments.
    Role,
    /// Audit log entries.
    AuditLog,
}

impl Resource {
    /// Returns a stable storage value for this resource.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Product => "product",
            Self::Tenant => "tenant",
            Self::Storefront => "storefront",
            Self::Shipping => "shipping",
            Self::Payment => "payment",
            Self::Webhook => "webhook",
            Self::Notification => "notification",
            Self::AdminUser => "admin_user",
            Self::Role => "role",
            Self::AuditLog => "audit_log",
        }
    }
}

impl FromStr for Resource {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "order" => Ok(Self::Order),
            "product" => Ok(Self::Product),
            "tenant" => Ok(Self::Tenant),
            "storefront" => Ok(Self::Storefront),
            "shipping" => Ok(Self::Shipping),
            "payment" => Ok(Self::Payment),
            "webhook" => Ok(Self::Webhook),
            "notification" => Ok(Self::Notification),
            "admin_user" => Ok(Self::AdminUser),
            "role" => Ok(Self::Role),
            "audit_log" => Ok(Self::AuditLog),
            _ => Err(AppError::Validation(format!(
                "unknown resource value '{value}'"
            ))),
        }
    }
}

/// Actions that can be performed on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read access.
    Read,
    /// Create and update access.
    Write,
    /// Delete access.
    Delete,
    /// Administrative control, including grants.
    Manage,
}

impl Action {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Manage => "manage",
        }
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "delete" => Ok(Self::Delete),
            "manage" => Ok(Self::Manage),
            _ => Err(AppError::Validation(format!(
                "unknown action value '{value}'"
            ))),
        }
    }
}

/// Breadth of applicability of a permission or a check.
///
/// Ordered `Global ⊇ Tenant ⊇ SelfOwned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    /// Applies across all tenants.
    Global,
    /// Applies within one tenant.
    Tenant,
    /// Applies only to the acting principal's own resources.
    #[serde(rename = "self")]
    SelfOwned,
}

impl PermissionScope {
    /// Returns a stable storage value for this scope.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Tenant => "tenant",
            Self::SelfOwned => "self",
        }
    }

    /// Returns whether a grant of this scope satisfies a check requiring `required`.
    #[must_use]
    pub fn satisfies(self, required: PermissionScope) -> bool {
        match (self, required) {
            (Self::Global, _) => true,
            (Self::Tenant, Self::Tenant | Self::SelfOwned) => true,
            (Self::Tenant, Self::Global) => false,
            (Self::SelfOwned, Self::SelfOwned) => true,
            (Self::SelfOwned, Self::Global | Self::Tenant) => false,
        }
    }

    /// Returns whether this scope can only be exercised inside one tenant.
    #[must_use]
    pub fn is_tenant_bound(self) -> bool {
        match self {
            Self::Global => false,
            Self::Tenant | Self::SelfOwned => true,
        }
    }
}

impl FromStr for PermissionScope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "global" => Ok(Self::Global),
            "tenant" => Ok(Self::Tenant),
            "self" => Ok(Self::SelfOwned),
            _ => Err(AppError::Validation(format!(
                "unknown permission scope value '{value}'"
            ))),
        }
    }
}

/// One entry of the permission catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    resource: Resource,
    action: Action,
    scope: PermissionScope,
}

const fn entry(resource: Resource, action: Action, scope: PermissionScope) -> Permission {
    Permission {
        resource,
        action,
        scope,
    }
}

const CATALOG: &[Permission] = &[
    entry(Resource::Order, Action::Read, PermissionScope::Global),
    entry(Resource::Order, Action::Write, PermissionScope::Global),
    entry(Resource::Order, Action::Read, PermissionScope::Tenant),
    entry(Resource::Order, Action::Write, PermissionScope::Tenant),
    entry(Resource::Order, Action::Delete, PermissionScope::Tenant),
    entry(Resource::Product, Action::Read, PermissionScope::Global),
    entry(Resource::Product, Action::Read, PermissionScope::Tenant),
    entry(Resource::Product, Action::Write, PermissionScope::Tenant),
    entry(Resource::Product, Action::Delete, PermissionScope::Tenant),
    entry(Resource::Tenant, Action::Read, PermissionScope::Global),
    entry(Resource::Tenant, Action::Manage, PermissionScope::Global),
    entry(Resource::Tenant, Action::Read, PermissionScope::Tenant),
    entry(Resource::Tenant, Action::Write, PermissionScope::Tenant),
    entry(Resource::Storefront, Action::Read, PermissionScope::Tenant),
    entry(Resource::Storefront, Action::Write, PermissionScope::Tenant),
    entry(Resource::Shipping, Action::Read, PermissionScope::Tenant),
    entry(Resource::Shipping, Action::Write, PermissionScope::Tenant),
    entry(Resource::Payment, Action::Manage, PermissionScope::Global),
    entry(Resource::Payment, Action::Read, PermissionScope::Tenant),
    entry(Resource::Webhook, Action::Manage, PermissionScope::Tenant),
    entry(Resource::Notification, Action::Manage, PermissionScope::Tenant),
    entry(Resource::AdminUser, Action::Read, PermissionScope::Global),
    entry(Resource::AdminUser, Action::Manage, PermissionScope::Global),
    entry(Resource::AdminUser, Action::Read, PermissionScope::Tenant),
    entry(Resource::AdminUser, Action::Manage, PermissionScope::Tenant),
    entry(Resource::AdminUser, Action::Read, PermissionScope::SelfOwned),
    entry(Resource::AdminUser, Action::Write, PermissionScope::SelfOwned),
    entry(Resource::Role, Action::Read, PermissionScope::Global),
    entry(Resource::Role, Action::Manage, PermissionScope::Global),
    entry(Resource::Role, Action::Manage, PermissionScope::Tenant),
    entry(Resource::AuditLog, Action::Read, PermissionScope::Global),
    entry(Resource::AuditLog, Action::Read, PermissionScope::Tenant),
];

impl Permission {
    /// Returns every catalog permission.
    #[must_use]
    pub fn catalog() -> &'static [Self] {
        CATALOG
    }

    /// Looks up a catalog entry by its parts.
    pub fn lookup(
        resource: Resource,
        action: Action,
        scope: PermissionScope,
    ) -> Result<Self, AppError> {
        let candidate = entry(resource, action, scope);
        if CATALOG.contains(&candidate) {
            return Ok(candidate);
        }

        Err(AppError::Validation(format!(
            "permission '{candidate}' is not part of the catalog"
        )))
    }

    /// Parses a storage or transport value such as `order:write@tenant`.
    pub fn from_transport(value: &str) -> Result<Self, AppError> {
        Self::from_str(value)
    }

    /// Returns the guarded resource.
    #[must_use]
    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// Returns the permitted action.
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// Returns the grant scope.
    #[must_use]
    pub fn scope(&self) -> PermissionScope {
        self.scope
    }

    /// Returns the stable identifier `resource:action@scope`.
    #[must_use]
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl Display for Permission {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}:{}@{}",
            self.resource.as_str(),
            self.action.as_str(),
            self.scope.as_str()
        )
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (resource_action, scope) = value.split_once('@').ok_or_else(|| {
            AppError::Validation(format!("permission '{value}' is missing a scope"))
        })?;
        let (resource, action) = resource_action.split_once(':').ok_or_else(|| {
            AppError::Validation(format!("permission '{value}' is missing an action"))
        })?;

        Self::lookup(
            Resource::from_str(resource)?,
            Action::from_str(action)?,
            PermissionScope::from_str(scope)?,
        )
    }
}

impl TryFrom<String> for Permission {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.to_string()
    }
}

/// A `(resource, action, scope)` requirement evaluated by the access verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionCheck {
    /// Guarded resource.
    pub resource: Resource,
    /// Requested action.
    pub action: Action,
    /// Narrowest scope the caller needs.
    pub scope: PermissionScope,
}

impl PermissionCheck {
    /// Creates a permission check.
    #[must_use]
    pub fn new(resource: Resource, action: Action, scope: PermissionScope) -> Self {
        Self {
            resource,
            action,
            scope,
        }
    }

    /// Returns whether `permission`, granted for `grant_tenant`, covers this
    /// check made in `tenant_context`.
    ///
    /// A global permission covers any check. A tenant or self permission only
    /// covers tenant or self checks made for the exact tenant the grant was
    /// scoped to; it never covers a check without tenant context.
    #[must_use]
    pub fn is_covered_by(
        &self,
        permission: Permission,
        grant_tenant: Option<TenantId>,
        tenant_context: Option<TenantId>,
    ) -> bool {
        if permission.resource != self.resource || permission.action != self.action {
            return false;
        }

        if !permission.scope.satisfies(self.scope) {
            return false;
        }

        if !permission.scope.is_tenant_bound() {
            return true;
        }

        match (grant_tenant, tenant_context) {
            (Some(granted_for), Some(requested_for)) => granted_for == requested_for,
            _ => false,
        }
    }
}

impl Display for PermissionCheck {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}:{}@{}",
            self.resource.as_str(),
            self.action.as_str(),
            self.scope.as_str()
        )
    }
}
