//! Submodule bundling all code for exit policy parsing in descriptors

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::error::DocumentParseError;
use crate::meta::Item;

//
// External dependencies
//
use ipnet::{IpNet, Ipv4Net};

#[derive(PartialEq, Debug, Clone)]
pub enum ExitPolicyAddress {
    Wildcard,
    Address(IpNet),
}

#[derive(PartialEq, Debug, Clone)]
pub enum ExitPortRange<T> {
    Single(T),
    Interval(T, T),
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ExitPolicyType {
    Accept,
    Reject,
}

impl FromStr for ExitPolicyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(ExitPolicyType::Accept),
            "reject" => Ok(ExitPolicyType::Reject),
            _ => Err(format!("expected \"accept\" or \"reject\", received: {}", s)),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum ExitPolicyPort {
    Wildcard,
    Port(ExitPortRange<u16>),
}

impl ExitPolicyPort {
    pub fn contains(&self, port: u16) -> bool {
        match self {
            ExitPolicyPort::Wildcard => true,
            ExitPolicyPort::Port(ExitPortRange::Single(v)) => *v == port,
            ExitPolicyPort::Port(ExitPortRange::Interval(from, to)) => *from <= port && port <= *to,
        }
    }
}

/// One `accept`/`reject` line of a server descriptor
#[derive(PartialEq, Debug, Clone)]
pub struct DescriptorExitPolicyRule {
    pub ep_type: ExitPolicyType,
    pub address: ExitPolicyAddress,
    pub port: ExitPolicyPort,
}

/// The full exit policy of a descriptor, in order of appearance
#[derive(PartialEq, Debug, Clone, Default)]
pub struct DescriptorExitPolicy {
    pub rules: Vec<DescriptorExitPolicyRule>,
}

impl DescriptorExitPolicy {
    pub(super) fn add_rule(&mut self, epr: DescriptorExitPolicyRule) {
        self.rules.push(epr);
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct DescriptorExitPolicyIPv6 {
    pub policy: ExitPolicyType,
    pub port_list: Vec<ExitPortRange<u16>>,
}

impl Default for DescriptorExitPolicyIPv6 {
    fn default() -> Self {
        // A missing "ipv6-policy" line is equivalent to "ipv6-policy reject 1-65535".
        DescriptorExitPolicyIPv6 {
            policy: ExitPolicyType::Reject,
            port_list: vec![ExitPortRange::Interval(1, 65535)],
        }
    }
}

/// `*`, `a.b.c.d`, `a.b.c.d/bits`, `a.b.c.d/m.m.m.m` or `[v6]/bits`
fn parse_exit_policy_address(addr_str: &str) -> Result<ExitPolicyAddress, String> {
    if addr_str == "*" {
        return Ok(ExitPolicyAddress::Wildcard);
    }
    let invalid = || format!("invalid address '{}'", addr_str);
    let (host, mask) = match addr_str.split_once('/') {
        Some((host, mask)) => (host, Some(mask)),
        None => (addr_str, None),
    };
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let addr = host.parse::<IpAddr>().map_err(|_| invalid())?;
    let network = match (addr, mask) {
        (_, None) => {
            let bits = if addr.is_ipv4() { 32 } else { 128 };
            IpNet::new(addr, bits).map_err(|_| invalid())?
        }
        (IpAddr::V4(v4), Some(mask)) if mask.contains('.') => {
            let mask = mask.parse::<Ipv4Addr>().map_err(|_| invalid())?;
            let prefix = ipnet::ipv4_mask_to_prefix(mask).map_err(|_| invalid())?;
            IpNet::V4(Ipv4Net::new(v4, prefix).map_err(|_| invalid())?)
        }
        (_, Some(bits)) => {
            let bits = crate::validate::uint(bits).map_err(|_| invalid())?;
            let bits = u8::try_from(bits).map_err(|_| invalid())?;
            IpNet::new(addr, bits).map_err(|_| invalid())?
        }
    };
    Ok(ExitPolicyAddress::Address(network))
}

fn parse_port(s: &str) -> Result<u16, String> {
    crate::validate::port(s).map_err(|e| e.to_string())
}

// Range = Port
// Range = Port "-" Port
fn parse_range(input: &str) -> Result<ExitPortRange<u16>, String> {
    match input.split_once('-') {
        Some((min, max)) => {
            let (min, max) = (parse_port(min)?, parse_port(max)?);
            if min > max {
                return Err(format!("empty port range '{}'", input));
            }
            Ok(ExitPortRange::Interval(min, max))
        }
        None => Ok(ExitPortRange::Single(parse_port(input)?)),
    }
}

pub(super) fn parse_exit_policy_port(port_str: &str) -> Result<ExitPolicyPort, String> {
    match port_str {
        "*" => Ok(ExitPolicyPort::Wildcard),
        _ => Ok(ExitPolicyPort::Port(parse_range(port_str)?)),
    }
}

/// Parse an `accept` or `reject` line
pub(super) fn parse_exit_policy_rule(
    item: &Item<'_>,
    ept: ExitPolicyType,
) -> Result<DescriptorExitPolicyRule, DocumentParseError> {
    let args = item.args_exact(1)?;
    let (address, port) = args[0]
        .rsplit_once(':')
        .ok_or_else(|| DocumentParseError::invalid(item, "missing ':' before port"))?;
    Ok(DescriptorExitPolicyRule {
        ep_type: ept,
        address: parse_exit_policy_address(address)
            .map_err(|e| DocumentParseError::invalid(item, e))?,
        port: parse_exit_policy_port(port).map_err(|e| DocumentParseError::invalid(item, e))?,
    })
}

/// Parse an `ipv6-policy accept|reject PortList` line
pub(super) fn parse_kw_ipv6_policy(
    item: &Item<'_>,
) -> Result<DescriptorExitPolicyIPv6, DocumentParseError> {
    let args = item.args_exact(2)?;
    let policy = args[0]
        .parse::<ExitPolicyType>()
        .map_err(|e| DocumentParseError::invalid(item, e))?;
    let port_list = crate::validate::comma_list(args[1])
        .map_err(|e| DocumentParseError::invalid(item, e))?
        .into_iter()
        .map(parse_range)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DocumentParseError::invalid(item, e))?;
    Ok(DescriptorExitPolicyIPv6 { policy, port_list })
}
