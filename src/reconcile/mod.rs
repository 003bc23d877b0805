
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryResult;
use crate::registry::{DhcpRegistry, Dhcpv6PrefixRecord};
use crate::subnet::{Malformed, SubnetRecord, classify_ipv4};

pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_millis(500);

/// Scope counts at or below this trigger the single retry.
const ANOMALY_THRESHOLD: usize = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub has_dhcp: bool,
    pub dhcp_scope_count: usize,
    pub matched_ipv4: Vec<String>,
    pub missing_in_dhcp: Vec<String>,
    pub extra_in_dhcp: Vec<String>,
    pub ipv6_matched: Vec<String>,
    pub ipv6_missing_in_dhcp: Vec<String>,
    /// Public scopes filed under the primary. The primary itself is listed
    /// only when it was registered and matched.
    pub registry_ipv4_scopes: Vec<String>,
    /// One prefix name per base name.
    pub registry_ipv6_prefixes: Vec<String>,
    pub primary_registered: bool,
    pub retried: bool,
}

/// What the registry holds for one device at one point in time.
#[derive(Debug)]
struct RegistrySnapshot {
    ipv4_scopes: Vec<String>,
    ipv6_prefixes: Vec<Dhcpv6PrefixRecord>,
    primary_registered: bool,
}

impl RegistrySnapshot {
    fn scope_count(&self) -> usize {
        self.ipv4_scopes.len() + self.ipv6_prefixes.len()
    }
}

pub struct Reconciler<R> {
    registry: R,
    retry_pause: Duration,
}

impl<R: DhcpRegistry> Reconciler<R> {
    pub fn new(registry: R) -> Self {
        Reconciler {
            registry,
            retry_pause: DEFAULT_RETRY_PAUSE,
        }
    }

    pub fn retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    pub async fn reconcile_discovery(
        &self,
        hostname: &str,
        discovery: &DiscoveryResult,
    ) -> ValidationResult {
        self.reconcile(
            hostname,
            discovery.primary_subnet.as_ref(),
            &discovery.public_ipv4_subnets,
            &discovery.public_ipv6_subnets,
        )
        .await
    }

    /// Never fails. A registry outage degrades the affected query to no rows.
    pub async fn reconcile(
        &self,
        hostname: &str,
        primary_subnet: Option<&SubnetRecord>,
        public_ipv4: &[SubnetRecord],
        public_ipv6: &[SubnetRecord],
    ) -> ValidationResult {
        let Some(primary) = primary_subnet else {
            return ValidationResult::default();
        };
        let primary = primary.as_str();

        let mut snapshot = self.snapshot(hostname, primary).await;
        let mut retried = false;

        if snapshot.scope_count() <= ANOMALY_THRESHOLD {
            info!(
                "{hostname} has {} scope(s), retrying registry query",
                snapshot.scope_count()
            );
            tokio::time::sleep(self.retry_pause).await;
            retried = true;

            let retry = self.snapshot(hostname, primary).await;
            if retry.scope_count() > snapshot.scope_count() {
                info!("Retry successful: {hostname} now has {} scopes", retry.scope_count());
                snapshot = retry;
            } else {
                info!("Retry did not improve results for {hostname}");
            }
        }

        let mut result = compare(&snapshot, primary, public_ipv4, public_ipv6);
        result.retried = retried;
        result
    }

    async fn snapshot(&self, hostname: &str, primary: &str) -> RegistrySnapshot {
        let scopes = self
            .registry
            .scopes_by_primary(primary)
            .await
            .unwrap_or_else(|e| {
                warn!("DHCP scope lookup for {primary} degraded to empty: {e}");
                Vec::new()
            });

        let prefixes = self
            .registry
            .ipv6_prefixes_by_hostname(hostname)
            .await
            .unwrap_or_else(|e| {
                warn!("DHCPv6 prefix lookup for {hostname} degraded to empty: {e}");
                Vec::new()
            });

        let primary_registered = scopes.iter().any(|s| s.scope == primary);
        let ipv4_scopes = scopes
            .into_iter()
            .map(|s| s.scope)
            .filter(|scope| scope != primary && classify_ipv4(scope, Malformed::AssumePublic))
            .collect();

        RegistrySnapshot {
            ipv4_scopes,
            ipv6_prefixes: dedup_prefixes(prefixes),
            primary_registered,
        }
    }
}

/// Keeps the first record seen for each `-PD`-stripped base name.
fn dedup_prefixes(records: Vec<Dhcpv6PrefixRecord>) -> Vec<Dhcpv6PrefixRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.base_name().to_string()))
        .collect()
}

fn compare(
    snapshot: &RegistrySnapshot,
    primary: &str,
    public_ipv4: &[SubnetRecord],
    public_ipv6: &[SubnetRecord],
) -> ValidationResult {
    let discovered_v4: BTreeSet<&str> = public_ipv4.iter().map(SubnetRecord::as_str).collect();
    let discovered_v6: BTreeSet<&str> = public_ipv6.iter().map(SubnetRecord::as_str).collect();

    let dhcp_scope_count = snapshot.scope_count();
    // A registered primary only counts when it is itself a discovered public subnet.
    let primary_matched = snapshot.primary_registered && discovered_v4.contains(primary);
    let has_dhcp = dhcp_scope_count > 0 || primary_matched;

    let mut result = ValidationResult {
        has_dhcp,
        dhcp_scope_count,
        registry_ipv4_scopes: snapshot.ipv4_scopes.clone(),
        registry_ipv6_prefixes: snapshot
            .ipv6_prefixes
            .iter()
            .map(|p| p.prefix_name.clone())
            .collect(),
        primary_registered: snapshot.primary_registered,
        ..ValidationResult::default()
    };

    if has_dhcp {
        let mut registry_v4: BTreeSet<&str> =
            snapshot.ipv4_scopes.iter().map(String::as_str).collect();
        // The primary can match but is never reported as extra.
        if primary_matched {
            registry_v4.insert(primary);
        }

        result.registry_ipv4_scopes = owned(registry_v4.iter());
        result.matched_ipv4 = owned(discovered_v4.intersection(&registry_v4));
        result.missing_in_dhcp = owned(discovered_v4.difference(&registry_v4));
        result.extra_in_dhcp = owned(registry_v4.difference(&discovered_v4));
    } else {
        result.missing_in_dhcp = owned(discovered_v4.iter());
    }

    if snapshot.ipv6_prefixes.is_empty() {
        result.ipv6_missing_in_dhcp = owned(discovered_v6.iter());
    } else {
        let registry_v6: BTreeSet<&str> = snapshot
            .ipv6_prefixes
            .iter()
            .map(|p| p.prefix_name.as_str())
            .collect();
        result.ipv6_matched = owned(discovered_v6.intersection(&registry_v6));
        result.ipv6_missing_in_dhcp = owned(discovered_v6.difference(&registry_v6));
    }

    result
}

fn owned<'a, 'b: 'a>(items: impl Iterator<Item = &'a &'b str>) -> Vec<String> {
    items.map(|s| s.to_string()).collect()
}
