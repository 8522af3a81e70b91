//! Target parsing and validation
//!
//! A target specification is one or more whitespace-separated tokens, each an
//! IPv4 address or an IPv4 CIDR block. Every token must fall inside the private
//! address ranges before anything is probed.

use ipnetwork::Ipv4Network;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::{Result, ScanError};

/// Private ranges a scan may touch, as (base, prefix)
const PRIVATE_RANGES: [(Ipv4Addr, u8); 3] = [
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
];

fn in_private_range(addr: Ipv4Addr, prefix: u8) -> bool {
    PRIVATE_RANGES.iter().any(|&(base, range_prefix)| {
        let mask = u32::MAX << (32 - u32::from(range_prefix));
        prefix >= range_prefix && u32::from(addr) & mask == u32::from(base)
    })
}

/// One validated token of a target specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetToken {
    Address(Ipv4Addr),
    Cidr(Ipv4Network),
}

impl TargetToken {
    /// Number of addresses the token covers
    pub fn host_count(&self) -> u64 {
        match self {
            TargetToken::Address(_) => 1,
            TargetToken::Cidr(network) => 1u64 << (32 - u32::from(network.prefix())),
        }
    }

    fn is_private(&self) -> bool {
        match self {
            TargetToken::Address(addr) => in_private_range(*addr, 32),
            // the whole block must sit inside one range, not just its first address
            TargetToken::Cidr(network) => in_private_range(network.ip(), network.prefix()),
        }
    }
}

impl fmt::Display for TargetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetToken::Address(addr) => write!(f, "{}", addr),
            TargetToken::Cidr(network) => write!(f, "{}/{}", network.ip(), network.prefix()),
        }
    }
}

impl FromStr for TargetToken {
    type Err = ScanError;

    fn from_str(token: &str) -> Result<Self> {
        match token.split_once('/') {
            Some((addr, prefix)) => {
                let addr = parse_dotted_quad(token, addr)?;
                if prefix.is_empty() || prefix.len() > 2 || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ScanError::InvalidTarget(format!(
                        "'{}' has an invalid prefix length",
                        token
                    )));
                }
                let prefix: u8 = prefix.parse().map_err(|_| {
                    ScanError::InvalidTarget(format!("'{}' has an invalid prefix length", token))
                })?;
                let network = Ipv4Network::new(addr, prefix).map_err(|_| {
                    ScanError::InvalidTarget(format!("'{}': prefix must be between 0 and 32", token))
                })?;
                Ok(TargetToken::Cidr(network))
            }
            None => Ok(TargetToken::Address(parse_dotted_quad(token, token)?)),
        }
    }
}

fn parse_dotted_quad(token: &str, addr: &str) -> Result<Ipv4Addr> {
    Ipv4Addr::from_str(addr).map_err(|_| {
        ScanError::InvalidTarget(format!("'{}' is not an IPv4 address or CIDR block", token))
    })
}

/// A validated target specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    tokens: Vec<TargetToken>,
}

impl TargetSpec {
    pub fn tokens(&self) -> &[TargetToken] {
        &self.tokens
    }

    /// Tokens rendered as probe arguments, in request order
    pub fn to_args(&self) -> Vec<String> {
        self.tokens.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self.to_args();
        write!(f, "{}", args.join(" "))
    }
}

/// Parse a target specification and check it against the private-range allowlist
pub fn validate(spec: &str) -> Result<TargetSpec> {
    let mut tokens = Vec::new();

    for raw in spec.split_whitespace() {
        let token: TargetToken = raw.parse()?;
        if !token.is_private() {
            return Err(ScanError::TargetNotAllowed(raw.to_string()));
        }
        tokens.push(token);
    }

    if tokens.is_empty() {
        return Err(ScanError::InvalidTarget("target cannot be empty".to_string()));
    }

    Ok(TargetSpec { tokens })
}

/// Number of addresses a specification covers
pub fn estimate_host_count(spec: &TargetSpec) -> u64 {
    spec.tokens
        .iter()
        .fold(0u64, |total, token| total.saturating_add(token.host_count()))
}

/// Enforce the configured host cap, if any
pub fn check_size(estimate: u64, max_hosts: Option<u64>) -> Result<()> {
    match max_hosts {
        Some(limit) if estimate > limit => Err(ScanError::TargetTooLarge { estimate, limit }),
        _ => Ok(()),
    }
}
