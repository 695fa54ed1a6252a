use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use praetor_core::{AppError, AppResult, PrincipalId};
use serde::{Deserialize, Serialize};

/// Administrative principal known to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminPrincipal {
    /// Stable principal identifier.
    pub id: PrincipalId,
    /// Subject reference issued by the identity provider.
    pub external_identity_ref: String,
    /// Email reported by the identity provider.
    pub email: Option<String>,
    /// Inactive principals are denied every check.
    pub is_active: bool,
    /// Super administrators hold the `super_admin` system role globally.
    pub is_super_admin: bool,
    /// Whether the identity provider must enforce a second factor.
    pub require_mfa: bool,
    /// Source networks the principal may act from; empty means unrestricted.
    pub allowed_ip_ranges: Vec<IpNet>,
    /// Last authentication event seen for the principal.
    pub last_login_at: Option<DateTime<Utc>>,
    /// Monotonic counter bumped on every change affecting resolution.
    pub assignment_version: i64,
}

impl AdminPrincipal {
    /// Returns whether a caller address passes the allow-list.
    ///
    /// An empty allow-list accepts any caller. A non-empty allow-list rejects
    /// callers whose address is unknown.
    #[must_use]
    pub fn allows_ip(&self, client_ip: Option<IpAddr>) -> bool {
        if self.allowed_ip_ranges.is_empty() {
            return true;
        }

        let Some(client_ip) = client_ip else {
            return false;
        };

        let client_ip = canonical_ip(client_ip);
        self.allowed_ip_ranges
            .iter()
            .any(|range| range.contains(&client_ip))
    }
}

/// Parses CIDR strings (or bare addresses) into an allow-list.
pub fn parse_ip_ranges<I, S>(values: I) -> AppResult<Vec<IpNet>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|value| {
            let value = value.as_ref().trim();
            IpNet::from_str(value)
                .or_else(|_| IpAddr::from_str(value).map(IpNet::from))
                .map(|range| range.trunc())
                .map_err(|error| {
                    AppError::Validation(format!("invalid ip range '{value}': {error}"))
                })
        })
        .collect()
}

fn canonical_ip(value: IpAddr) -> IpAddr {
    match value {
        IpAddr::V6(address) => address
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(address)),
        IpAddr::V4(_) => value,
    }
}
