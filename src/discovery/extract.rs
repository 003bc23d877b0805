use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

static IPV4_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ip address (\d+\.\d+\.\d+\.\d+)\s+(\d+\.\d+\.\d+\.\d+)([ \t]+secondary)?")
        .expect("Invalid IPv4 address regex")
});

static IPV6_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ipv6 address ([0-9a-fA-F:]+)/(\d+)").expect("Invalid IPv6 address regex")
});

/// An address statement found in a configuration, before normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressToken {
    V4 {
        address: String,
        mask: String,
        secondary: bool,
    },
    V6 {
        address: String,
        prefix: String,
    },
}

/// How a dialect's address statements are located in the raw config text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Scan only the first `interface <name>` block.
    Block { interface: &'static str },
    /// Scan every line that starts with the full command prefix.
    LinePrefixed { prefix: &'static str },
}

impl Strategy {
    /// IPv4 tokens come first, then IPv6, each in config order.
    pub fn extract(&self, config: &str) -> Vec<AddressToken> {
        let text = match self {
            Strategy::Block { interface } => match interface_block(config, interface) {
                Some(block) => block,
                None => {
                    debug!("No `interface {interface}` block in config");
                    return Vec::new();
                }
            },
            Strategy::LinePrefixed { prefix } => prefixed_lines(config, prefix),
        };

        scan_tokens(&text)
    }
}

/// Returns the lines following the first `interface <name>` header, up to the
/// next top-level `interface` command or a bare `!`.
pub fn interface_block(config: &str, interface: &str) -> Option<String> {
    let header = format!("interface {interface}");
    let mut lines = config.lines();
    lines.by_ref().find(|line| line.trim() == header)?;

    let body: Vec<&str> = lines.take_while(|line| !ends_block(line)).collect();
    Some(body.join("\n"))
}

fn ends_block(line: &str) -> bool {
    line.starts_with("interface ") || line.trim() == "!"
}

/// Collects what follows `prefix` on each line carrying it.
fn prefixed_lines(config: &str, prefix: &str) -> String {
    config
        .lines()
        .filter_map(|line| {
            let line = line.trim_start().trim_start_matches('/');
            let rest = line.strip_prefix(prefix)?;
            // `cable-mac 1.0` must not match `cable-mac 1.01`
            rest.starts_with(char::is_whitespace).then(|| rest.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn scan_tokens(text: &str) -> Vec<AddressToken> {
    let ipv4 = IPV4_ADDRESS.captures_iter(text).map(|caps| AddressToken::V4 {
        address: caps[1].to_string(),
        mask: caps[2].to_string(),
        secondary: caps.get(3).is_some(),
    });

    let ipv6 = IPV6_ADDRESS.captures_iter(text).map(|caps| AddressToken::V6 {
        address: caps[1].to_string(),
        prefix: caps[2].to_string(),
    });

    ipv4.chain(ipv6).collect()
}
