use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppError;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID value.
            #[must_use]
            pub fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            /// Returns the underlying UUID value.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(value.trim()).map(Self).map_err(|error| {
                    AppError::Validation(format!(
                        concat!("invalid ", $label, " '{}': {}"),
                        value, error
                    ))
                })
            }
        }
    };
}

uuid_identifier!(
    /// Tenant identifier; the partition key for tenant-scoped grants.
    TenantId,
    "tenant id"
);
uuid_identifier!(
    /// Administrative principal identifier.
    PrincipalId,
    "principal id"
);
uuid_identifier!(
    /// Role identifier.
    RoleId,
    "role id"
);
uuid_identifier!(
    /// Role assignment identifier.
    AssignmentId,
    "assignment id"
);
uuid_identifier!(
    /// Audit entry identifier.
    AuditEntryId,
    "audit entry id"
);
