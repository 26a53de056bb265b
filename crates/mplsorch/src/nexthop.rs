//! Nexthop descriptors for label forwarding entries.
//!
//! A nexthop is identified by a gateway address, an interface, or both.
//! Resolution (interface state, reachability of the gateway) belongs to the
//! nexthop tracking collaborator and is only queried through
//! [`NexthopResolver`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::MplsError;
use crate::vrf::VrfId;

/// Address family of a nexthop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// IPv4 gateway or interface-only nexthop.
    Ipv4,
    /// IPv6 gateway.
    Ipv6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "ipv4"),
            AddressFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// A nexthop: gateway address and/or outgoing interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NexthopDescriptor {
    gate: Option<IpAddr>,
    ifname: Option<String>,
}

impl NexthopDescriptor {
    /// Creates a gateway nexthop.
    pub fn gateway(gate: impl Into<IpAddr>) -> Self {
        Self {
            gate: Some(gate.into()),
            ifname: None,
        }
    }

    /// Creates an interface-only nexthop.
    pub fn interface_only(ifname: impl Into<String>) -> Self {
        Self {
            gate: None,
            ifname: Some(ifname.into()),
        }
    }

    /// Binds the nexthop to an interface.
    pub fn with_interface(mut self, ifname: impl Into<String>) -> Self {
        self.ifname = Some(ifname.into());
        self
    }

    /// Returns the gateway address.
    pub fn gate(&self) -> Option<&IpAddr> {
        self.gate.as_ref()
    }

    /// Returns the interface name.
    pub fn ifname(&self) -> Option<&str> {
        self.ifname.as_deref()
    }

    /// Returns the address family. Interface-only nexthops count as IPv4.
    pub fn family(&self) -> AddressFamily {
        match self.gate {
            Some(IpAddr::V6(_)) => AddressFamily::Ipv6,
            _ => AddressFamily::Ipv4,
        }
    }

    /// Checks that at least a gateway or an interface is present.
    pub fn validate(&self) -> Result<(), MplsError> {
        match (&self.gate, &self.ifname) {
            (None, None) => Err(MplsError::InvalidNexthop(
                "neither gateway nor interface".to_string(),
            )),
            (_, Some(name)) if name.is_empty() => {
                Err(MplsError::InvalidNexthop("empty interface name".to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for NexthopDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.gate, &self.ifname) {
            (Some(gate), Some(ifname)) => write!(f, "{}@{}", gate, ifname),
            (Some(gate), None) => write!(f, "{}", gate),
            (None, Some(ifname)) => write!(f, "{}", ifname),
            (None, None) => write!(f, "-"),
        }
    }
}

impl FromStr for NexthopDescriptor {
    type Err = MplsError;

    /// Parses a nexthop.
    ///
    /// Formats supported:
    /// - `ip` - gateway
    /// - `ip@alias` - gateway bound to an interface
    /// - `alias` - interface only
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MplsError::InvalidNexthop("empty nexthop".to_string()));
        }

        let nexthop = if let Some((ip_part, alias)) = s.split_once('@') {
            let gate: IpAddr = ip_part
                .parse()
                .map_err(|_| MplsError::InvalidNexthop(format!("Invalid IP address: {}", ip_part)))?;
            Self::gateway(gate).with_interface(alias)
        } else if let Ok(gate) = s.parse::<IpAddr>() {
            Self::gateway(gate)
        } else if s.contains(':') || s.chars().all(|c| c.is_ascii_digit() || c == '.') {
            // Looks like an address but did not parse as one.
            return Err(MplsError::InvalidNexthop(format!("Invalid IP address: {}", s)));
        } else {
            Self::interface_only(s)
        };

        nexthop.validate()?;
        Ok(nexthop)
    }
}

impl TryFrom<String> for NexthopDescriptor {
    type Error = MplsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NexthopDescriptor> for String {
    fn from(nexthop: NexthopDescriptor) -> Self {
        nexthop.to_string()
    }
}

/// Nexthop resolution, owned by the nexthop tracking subsystem.
///
/// A candidate whose nexthop is not active never gets selected. When the
/// answer for some nexthop changes, the owner of the resolver must trigger
/// a reschedule so affected entries are re-selected.
pub trait NexthopResolver: Send + Sync {
    /// Returns true if the nexthop is usable for forwarding in `vrf`.
    fn is_active(&self, vrf: VrfId, nexthop: &NexthopDescriptor) -> bool;
}

/// Resolver that treats every nexthop as reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysActive;

impl NexthopResolver for AlwaysActive {
    fn is_active(&self, _vrf: VrfId, _nexthop: &NexthopDescriptor) -> bool {
        true
    }
}
