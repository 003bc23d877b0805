use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};

const PRIVATE_IPV4_RANGES: [(Ipv4Addr, u8); 4] = [
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    // RFC 2544 benchmarking
    (Ipv4Addr::new(198, 18, 0, 0), 15),
];

const NON_PUBLIC_IPV6_PREFIXES: [&str; 3] = ["fe80:", "fc00:", "fd00:"];

/// What to answer when an address cannot be parsed.
///
/// Config extraction treats garbage as not public so it never reaches the
/// compliance feed. The registry side assumes public so a malformed scope
/// still shows up as an extra entry during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    NotPublic,
    AssumePublic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpVersion {
    #[serde(rename = "4")]
    V4,
    #[serde(rename = "6")]
    V6,
}

/// A subnet in `address/prefix` form with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubnetRecord {
    pub cidr: String,
    pub is_public: bool,
    pub ip_version: IpVersion,
}

impl SubnetRecord {
    pub fn ipv4(cidr: String) -> Self {
        let is_public = is_public_ipv4(&cidr);
        SubnetRecord {
            cidr,
            is_public,
            ip_version: IpVersion::V4,
        }
    }

    pub fn ipv6(cidr: String) -> Self {
        let is_public = is_public_ipv6(&cidr);
        SubnetRecord {
            cidr,
            is_public,
            ip_version: IpVersion::V6,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.cidr
    }
}

impl fmt::Display for SubnetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cidr)
    }
}

/// Returns false for RFC 1918 space and 198.18.0.0/15, true otherwise.
///
/// Accepts a bare address or a CIDR; only the address part is inspected.
/// Unparseable input is not public.
pub fn is_public_ipv4(ip: &str) -> bool {
    classify_ipv4(ip, Malformed::NotPublic)
}

pub fn classify_ipv4(ip: &str, malformed: Malformed) -> bool {
    let Some(addr) = address_part(ip).parse::<Ipv4Addr>().ok() else {
        return malformed == Malformed::AssumePublic;
    };

    !PRIVATE_IPV4_RANGES.iter().any(|(network, prefix)| {
        Ipv4Net::new(*network, *prefix)
            .map(|net| net.contains(&addr))
            .unwrap_or(false)
    })
}

/// Returns false for link-local (`fe80:`) and unique local (`fc00:`, `fd00:`)
/// addresses. Only the textual prefix is checked.
pub fn is_public_ipv6(ip: &str) -> bool {
    let lower = ip.trim().to_ascii_lowercase();
    !NON_PUBLIC_IPV6_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Counts the set bits of a dotted netmask. Contiguity is not checked.
pub fn netmask_to_prefix(mask: &str) -> Option<u8> {
    let mask: Ipv4Addr = mask.trim().parse().ok()?;
    Some(u32::from(mask).count_ones() as u8)
}

/// Clears the host bits of `host` and returns `network/prefix`.
///
/// `mask_or_prefix` may be a dotted IPv4 netmask or a prefix length. Anything
/// that cannot be parsed comes back as `host/mask_or_prefix`, untouched.
pub fn normalize_subnet(host: &str, mask_or_prefix: &str) -> String {
    try_normalize(host.trim(), mask_or_prefix.trim())
        .unwrap_or_else(|| format!("{host}/{mask_or_prefix}"))
}

fn try_normalize(host: &str, mask_or_prefix: &str) -> Option<String> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        let prefix = match mask_or_prefix.parse::<u8>() {
            Ok(prefix) => prefix,
            Err(_) => netmask_to_prefix(mask_or_prefix)?,
        };
        let net = Ipv4Net::new(addr, prefix).ok()?;
        return Some(net.trunc().to_string());
    }

    let addr = host.parse::<Ipv6Addr>().ok()?;
    let prefix = mask_or_prefix.parse::<u8>().ok()?;
    let net = Ipv6Net::new(addr, prefix).ok()?;
    Some(net.trunc().to_string())
}

fn address_part(ip: &str) -> &str {
    ip.trim().split('/').next().unwrap_or_default()
}
