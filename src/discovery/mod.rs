mod extract;
mod mirror;

#[cfg(test)]
mod tests;

pub use extract::{AddressToken, Strategy};
pub use mirror::mirror_source;

use std::net::Ipv4Addr;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::subnet::{SubnetRecord, netmask_to_prefix, normalize_subnet};

pub const UNKNOWN_VENDOR: &str = "unknown";

// Delegated /56 prefixes are reported at the /40 site aggregate.
const DELEGATED_PREFIX: &str = "56";
const SITE_AGGREGATE_PREFIX: &str = "40";

static CASA_100G_HOSTNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)CCAP1\d{2}|CBR\d{2}").expect("Invalid Casa hostname regex"));

static COMMSCOPE_EVO_HOSTNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)CCAPV\d{3}").expect("Invalid EVO hostname regex"));

static COMMSCOPE_E6000_HOSTNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)CCAP0\d{2}|DBR\d{2}").expect("Invalid E6000 hostname regex"));

/// Configuration dialects, in hostname matching priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    Casa100G,
    CommscopeEvo,
    CommscopeE6000,
    GenericIos,
}

impl Dialect {
    const PRIORITY: [Dialect; 4] = [
        Dialect::Casa100G,
        Dialect::CommscopeEvo,
        Dialect::CommscopeE6000,
        Dialect::GenericIos,
    ];

    /// Never fails: hostnames matching no pattern use the generic dialect.
    pub fn select(hostname: &str) -> Dialect {
        Self::PRIORITY
            .into_iter()
            .find(|dialect| {
                dialect
                    .hostname_pattern()
                    .is_some_and(|pattern| pattern.is_match(hostname))
            })
            .unwrap_or(Dialect::GenericIos)
    }

    pub fn label(self) -> &'static str {
        match self {
            Dialect::Casa100G => "Casa-100G",
            Dialect::CommscopeEvo => "Commscope-EVO",
            Dialect::CommscopeE6000 => "Commscope-E6000",
            Dialect::GenericIos => "Generic-IOS",
        }
    }

    pub fn interface(self) -> &'static str {
        match self {
            Dialect::Casa100G | Dialect::CommscopeEvo => "ip-bundle 1",
            Dialect::CommscopeE6000 => "cable-mac 1.0",
            Dialect::GenericIos => "Bundle1",
        }
    }

    pub fn strategy(self) -> Strategy {
        match self {
            Dialect::CommscopeE6000 => Strategy::LinePrefixed {
                prefix: "configure interface cable-mac 1.0",
            },
            _ => Strategy::Block {
                interface: self.interface(),
            },
        }
    }

    fn hostname_pattern(self) -> Option<&'static Regex> {
        match self {
            Dialect::Casa100G => Some(&CASA_100G_HOSTNAME),
            Dialect::CommscopeEvo => Some(&COMMSCOPE_EVO_HOSTNAME),
            Dialect::CommscopeE6000 => Some(&COMMSCOPE_E6000_HOSTNAME),
            Dialect::GenericIos => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub device_name: String,
    pub vendor: String,
    pub interface_name: String,
    pub primary_subnet: Option<SubnetRecord>,
    pub public_ipv4_subnets: Vec<SubnetRecord>,
    pub public_ipv6_subnets: Vec<SubnetRecord>,
    pub mirror_source: Option<Ipv4Addr>,
    pub found: bool,
}

impl DiscoveryResult {
    fn empty(device_name: &str, vendor: &str, interface_name: &str) -> Self {
        DiscoveryResult {
            device_name: device_name.to_string(),
            vendor: vendor.to_string(),
            interface_name: interface_name.to_string(),
            primary_subnet: None,
            public_ipv4_subnets: Vec::new(),
            public_ipv6_subnets: Vec::new(),
            mirror_source: None,
            found: false,
        }
    }

    pub fn public_ipv4_cidrs(&self) -> impl Iterator<Item = &str> {
        self.public_ipv4_subnets.iter().map(SubnetRecord::as_str)
    }

    pub fn public_ipv6_cidrs(&self) -> impl Iterator<Item = &str> {
        self.public_ipv6_subnets.iter().map(SubnetRecord::as_str)
    }
}

/// Finds the primary subnet and the public subnets on a device's service
/// interface. Pure: identical input gives identical output.
pub fn discover(device_name: &str, raw_config_text: &str) -> DiscoveryResult {
    if device_name.trim().is_empty() {
        warn!("Skipping discovery for device without a hostname");
        return DiscoveryResult::empty(device_name, UNKNOWN_VENDOR, "");
    }

    let dialect = Dialect::select(device_name);
    let mut result = DiscoveryResult::empty(device_name, dialect.label(), dialect.interface());

    if raw_config_text.trim().is_empty() {
        debug!("No configuration for {device_name}");
        return result;
    }

    let mut collector = SubnetCollector::default();
    for token in dialect.strategy().extract(raw_config_text) {
        collector.push(device_name, token);
    }

    result.primary_subnet = collector.primary;
    result.public_ipv4_subnets = collector.ipv4;
    result.public_ipv6_subnets = collector.ipv6;
    result.mirror_source = mirror_source(raw_config_text);
    result.found = !result.public_ipv4_subnets.is_empty() || !result.public_ipv6_subnets.is_empty();

    debug!(
        "Discovered {} IPv4 and {} IPv6 public subnets on {device_name} ({})",
        result.public_ipv4_subnets.len(),
        result.public_ipv6_subnets.len(),
        dialect.label()
    );

    result
}

#[derive(Default)]
struct SubnetCollector {
    primary: Option<SubnetRecord>,
    ipv4: Vec<SubnetRecord>,
    ipv6: Vec<SubnetRecord>,
}

impl SubnetCollector {
    fn push(&mut self, device_name: &str, token: AddressToken) {
        match token {
            AddressToken::V4 {
                address,
                mask,
                secondary,
            } => {
                let Some(prefix) = netmask_to_prefix(&mask) else {
                    warn!("Ignoring invalid netmask {mask} for {address} on {device_name}");
                    return;
                };

                let record = SubnetRecord::ipv4(normalize_subnet(&address, &prefix.to_string()));

                // The primary is the join key into the registry, public or not.
                if !secondary && self.primary.is_none() {
                    self.primary = Some(record.clone());
                }

                if record.is_public {
                    push_unique(&mut self.ipv4, record);
                }
            }
            AddressToken::V6 { address, prefix } => {
                let prefix = if prefix == DELEGATED_PREFIX {
                    SITE_AGGREGATE_PREFIX
                } else {
                    prefix.as_str()
                };

                let record = SubnetRecord::ipv6(normalize_subnet(&address, prefix));
                if record.is_public {
                    push_unique(&mut self.ipv6, record);
                }
            }
        }
    }
}

fn push_unique(list: &mut Vec<SubnetRecord>, record: SubnetRecord) {
    if !list.contains(&record) {
        list.push(record);
    }
}
