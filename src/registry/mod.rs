mod store;

pub use store::SqliteRegistry;

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Suffix marking a prefix-delegation duplicate of a DHCPv6 prefix.
pub const PREFIX_DELEGATION_SUFFIX: &str = "-PD";

/// An IPv4 scope filed under a primary subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpScopeRecord {
    pub scope: String,
    pub primary_scope: String,
    pub class: Option<String>,
    pub disabled: bool,
    pub total: Option<i64>,
    pub free_leases: Option<i64>,
    pub leases: Option<i64>,
}

impl DhcpScopeRecord {
    pub fn new(scope: &str, primary_scope: &str) -> Self {
        DhcpScopeRecord {
            scope: scope.to_string(),
            primary_scope: primary_scope.to_string(),
            class: None,
            disabled: false,
            total: None,
            free_leases: None,
            leases: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dhcpv6PrefixRecord {
    pub prefix_name: String,
    pub hostname: String,
    pub leased: Option<i64>,
    pub dynamic: Option<i64>,
}

impl Dhcpv6PrefixRecord {
    pub fn new(prefix_name: &str, hostname: &str) -> Self {
        Dhcpv6PrefixRecord {
            prefix_name: prefix_name.to_string(),
            hostname: hostname.to_string(),
            leased: None,
            dynamic: None,
        }
    }

    /// The prefix name with any `-PD` suffix removed.
    pub fn base_name(&self) -> &str {
        self.prefix_name
            .strip_suffix(PREFIX_DELEGATION_SUFFIX)
            .unwrap_or(&self.prefix_name)
    }
}

/// Read-only access to the authoritative DHCP registry.
pub trait DhcpRegistry: Send + Sync {
    fn scopes_by_primary(
        &self,
        primary_scope: &str,
    ) -> impl Future<Output = Result<Vec<DhcpScopeRecord>>> + Send;

    fn ipv6_prefixes_by_hostname(
        &self,
        hostname: &str,
    ) -> impl Future<Output = Result<Vec<Dhcpv6PrefixRecord>>> + Send;
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug)]
pub enum RegistryError {
    Unavailable(String),
    Timeout(Duration),
    Query(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Unavailable(msg) => write!(f, "Registry unavailable: {}", msg),
            RegistryError::Timeout(after) => write!(f, "Registry timed out after {:?}", after),
            RegistryError::Query(msg) => write!(f, "Registry query failed: {}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::CannotOpen
                ) =>
            {
                RegistryError::Unavailable(err.to_string())
            }
            _ => RegistryError::Query(err.to_string()),
        }
    }
}
