use std::net::Ipv4Addr;

use crate::discovery::{Dialect, UNKNOWN_VENDOR, discover};
use crate::subnet::{IpVersion, SubnetRecord};

const CASA_CONFIG: &str = "\
hostname ASD-LC0003-CCAP105
!
interface gige 0/0.0
 ip address 10.10.10.1 255.255.255.252
!
interface ip-bundle 1
 ip address 10.254.216.1 255.255.255.0
 ip address 203.80.1.1 255.255.252.0 secondary
 ip address 172.20.0.1 255.255.0.0 secondary
 ipv6 address 2a02:1234:5600::1/56
 ipv6 address fe80::1/64
 ipv6 address 2001:db8:200::1/48
!
interface ip-bundle 1.1
 ip address 198.51.100.1 255.255.255.0 secondary
!
";

const E6000_CONFIG: &str = "\
configure interface cable-mac 1.0 description \"bundle 1\"
configure interface cable-mac 1.0 ip address 192.0.2.5 255.255.255.0
configure interface cable-mac 1.0 ip address 100.64.0.1 255.255.240.0 secondary
configure interface cable-mac 1.0 ipv6 address 2001:db8:aa00::1/56
configure interface cable-mac 2.0 ip address 198.51.100.1 255.255.255.0
";

#[test]
fn test_dialect_selection() {
    assert_eq!(Dialect::select("ASD-LC0003-CCAP105"), Dialect::Casa100G);
    assert_eq!(Dialect::select("rtd-cbr12-01"), Dialect::Casa100G);
    assert_eq!(Dialect::select("UT-CCAPV001"), Dialect::CommscopeEvo);
    assert_eq!(Dialect::select("ZNB-LC0001-CCAP001"), Dialect::CommscopeE6000);
    assert_eq!(Dialect::select("HLM-DBR07"), Dialect::CommscopeE6000);
    assert_eq!(Dialect::select("RTR-EDGE-01"), Dialect::GenericIos);
    assert_eq!(Dialect::select(""), Dialect::GenericIos);
}

#[test]
fn test_dialect_interfaces() {
    assert_eq!(Dialect::Casa100G.label(), "Casa-100G");
    assert_eq!(Dialect::Casa100G.interface(), "ip-bundle 1");
    assert_eq!(Dialect::CommscopeEvo.interface(), "ip-bundle 1");
    assert_eq!(Dialect::CommscopeE6000.interface(), "cable-mac 1.0");
    assert_eq!(Dialect::GenericIos.interface(), "Bundle1");
}

#[test]
fn test_casa_block_discovery() {
    let result = discover("ASD-LC0003-CCAP105", CASA_CONFIG);

    assert!(result.found);
    assert_eq!(result.vendor, "Casa-100G");
    assert_eq!(result.interface_name, "ip-bundle 1");

    // Private primary is still the primary.
    let primary = result.primary_subnet.clone().unwrap();
    assert_eq!(primary.cidr, "10.254.216.0/24");
    assert!(!primary.is_public);

    let ipv4: Vec<&str> = result.public_ipv4_cidrs().collect();
    assert_eq!(ipv4, vec!["203.80.0.0/22"]);

    let ipv6: Vec<&str> = result.public_ipv6_cidrs().collect();
    assert_eq!(ipv6, vec!["2a02:1234:5600::/40", "2001:db8:200::/48"]);
    assert!(result.public_ipv6_subnets.iter().all(|s| s.ip_version == IpVersion::V6));
}

#[test]
fn test_e6000_line_discovery() {
    let result = discover("ZNB-LC0001-CCAP001", E6000_CONFIG);

    assert!(result.found);
    assert_eq!(result.vendor, "Commscope-E6000");
    assert_eq!(
        result.primary_subnet,
        Some(SubnetRecord::ipv4("192.0.2.0/24".to_string()))
    );
    let ipv4: Vec<&str> = result.public_ipv4_cidrs().collect();
    assert_eq!(ipv4, vec!["192.0.2.0/24", "100.64.0.0/20"]);
    let ipv6: Vec<&str> = result.public_ipv6_cidrs().collect();
    assert_eq!(ipv6, vec!["2001:db8:aa00::/40"]);
}

#[test]
fn test_primary_is_first_non_secondary() {
    let config = "\
interface Bundle1
 ip address 192.168.50.1 255.255.255.0
 ip address 198.51.100.1 255.255.255.0 secondary
 ip address 203.0.113.1 255.255.255.0
!
";
    let result = discover("RTR-EDGE-01", config);
    assert_eq!(result.primary_subnet.as_ref().unwrap().cidr, "192.168.50.0/24");
    let ipv4: Vec<&str> = result.public_ipv4_cidrs().collect();
    assert_eq!(ipv4, vec!["198.51.100.0/24", "203.0.113.0/24"]);
}

#[test]
fn test_only_secondary_addresses_have_no_primary() {
    let config = "interface Bundle1\n ip address 198.51.100.1 255.255.255.0 secondary\n!\n";
    let result = discover("RTR-EDGE-01", config);
    assert!(result.primary_subnet.is_none());
    assert!(result.found);
}

#[test]
fn test_private_only_block_is_not_found() {
    let config = "interface Bundle1\n ip address 10.0.0.1 255.255.255.0\n ipv6 address fd00::1/64\n!\n";
    let result = discover("RTR-EDGE-01", config);
    assert!(!result.found);
    assert_eq!(result.primary_subnet.as_ref().unwrap().cidr, "10.0.0.0/24");
}

#[test]
fn test_empty_config_is_not_found() {
    let result = discover("ZNB-LC0001-CCAP001", "   \n");
    assert!(!result.found);
    assert_eq!(result.vendor, "Commscope-E6000");
    assert!(result.primary_subnet.is_none());
    assert!(result.public_ipv4_subnets.is_empty());
    assert!(result.public_ipv6_subnets.is_empty());
}

#[test]
fn test_missing_block_is_not_found() {
    let result = discover("RTR-EDGE-01", CASA_CONFIG);
    assert!(!result.found);
    assert_eq!(result.vendor, "Generic-IOS");
    assert!(result.primary_subnet.is_none());
}

#[test]
fn test_blank_hostname_is_unknown_vendor() {
    let result = discover("  ", CASA_CONFIG);
    assert_eq!(result.vendor, UNKNOWN_VENDOR);
    assert!(!result.found);
}

#[test]
fn test_invalid_netmask_skipped() {
    let config = "interface Bundle1\n ip address 203.0.113.1 255.255.256.0\n ip address 198.51.100.1 255.255.255.0\n!\n";
    let result = discover("RTR-EDGE-01", config);
    assert_eq!(result.primary_subnet.as_ref().unwrap().cidr, "198.51.100.0/24");
    assert_eq!(result.public_ipv4_subnets.len(), 1);
}

#[test]
fn test_duplicate_networks_listed_once() {
    let config = "interface Bundle1\n ip address 198.51.100.1 255.255.255.0\n ip address 198.51.100.2 255.255.255.0 secondary\n!\n";
    let result = discover("RTR-EDGE-01", config);
    assert_eq!(result.public_ipv4_subnets.len(), 1);
}

#[test]
fn test_mirror_source_reported() {
    let config = "interface Bundle1\n ip address 198.51.100.1 255.255.255.0\n!\n/configure mirror mirror-dest \"LI_MIRROR\" encap layer-3-encap gateway ip-address source 213.51.63.1\n";
    let result = discover("RTR-EDGE-01", config);
    assert_eq!(result.mirror_source, Some(Ipv4Addr::new(213, 51, 63, 1)));
}

#[test]
fn test_discover_is_idempotent() {
    let first = discover("ASD-LC0003-CCAP105", CASA_CONFIG);
    let second = discover("ASD-LC0003-CCAP105", CASA_CONFIG);
    assert_eq!(first, second);
}
