use std::net::Ipv4Addr;

use once_cell::sync::Lazy;
use regex::Regex;

// The stanza may be flattened onto one line or spread over a block.
static MIRROR_SOURCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)mirror-dest\s+"LI_MIRROR".*?gateway\s+ip-address\s+source\s+(\d+\.\d+\.\d+\.\d+)"#)
        .expect("Invalid mirror-dest regex")
});

/// Source address of the `LI_MIRROR` mirror destination, as configured on
/// Nokia SR routers.
pub fn mirror_source(config: &str) -> Option<Ipv4Addr> {
    let caps = MIRROR_SOURCE.captures(config)?;
    caps[1].parse().ok()
}
