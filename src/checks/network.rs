//! Reserved and private address ranges used by `ip_is_private`

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidNetwork(String);

impl fmt::Display for InvalidNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid IP address or network {:?}", self.0)
    }
}

impl std::error::Error for InvalidNetwork {}

/// An address block in CIDR form, host bits cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNet {
    addr: IpAddr,
    prefix: u8,
}

impl IpNet {
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, InvalidNetwork> {
        if prefix > width(&addr) {
            return Err(InvalidNetwork(format!("{addr}/{prefix}")));
        }
        Ok(Self {
            addr: mask(addr, prefix),
            prefix,
        })
    }

    const fn v4(a: u8, b: u8, c: u8, d: u8, prefix: u8) -> Self {
        Self {
            addr: IpAddr::V4(Ipv4Addr::new(a, b, c, d)),
            prefix,
        }
    }

    const fn v6(addr: Ipv6Addr, prefix: u8) -> Self {
        Self {
            addr: IpAddr::V6(addr),
            prefix,
        }
    }

    /// A single address as a full-length network
    pub fn host(addr: IpAddr) -> Self {
        let addr = normalize(addr);
        Self {
            prefix: width(&addr),
            addr,
        }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.intersects(&IpNet::host(ip))
    }

    /// Whether the two blocks share at least one address
    pub fn intersects(&self, other: &IpNet) -> bool {
        if self.addr.is_ipv4() != other.addr.is_ipv4() {
            return false;
        }
        let prefix = self.prefix.min(other.prefix);
        mask(self.addr, prefix) == mask(other.addr, prefix)
    }
}

impl FromStr for IpNet {
    type Err = InvalidNetwork;

    /// Accepts a bare address or `addr/prefix`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidNetwork(s.to_string());
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
                let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
                IpNet::new(addr, prefix).map_err(|_| invalid())
            }
            None => s.parse().map(IpNet::host).map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for IpNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

fn width(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

// Bare IPv4-mapped IPv6 addresses are compared as IPv4.
fn normalize(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => addr,
        },
        v4 => v4,
    }
}

fn mask(addr: IpAddr, prefix: u8) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = u32::MAX.checked_shl(32 - prefix as u32).unwrap_or(0);
            IpAddr::V4(Ipv4Addr::from(bits & mask))
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = u128::MAX.checked_shl(128 - prefix as u32).unwrap_or(0);
            IpAddr::V6(Ipv6Addr::from(bits & mask))
        }
    }
}

const RESERVED: [IpNet; 21] = [
    // RFC 1918
    IpNet::v4(10, 0, 0, 0, 8),
    IpNet::v4(172, 16, 0, 0, 12),
    IpNet::v4(192, 168, 0, 0, 16),
    // RFC 6598
    IpNet::v4(100, 64, 0, 0, 10),
    // RFC 5735
    IpNet::v4(0, 0, 0, 0, 8),
    IpNet::v4(127, 0, 0, 0, 8),
    IpNet::v4(169, 254, 0, 0, 16),
    IpNet::v4(192, 0, 0, 0, 24),
    IpNet::v4(192, 0, 2, 0, 24),
    IpNet::v4(192, 88, 99, 0, 24),
    IpNet::v4(198, 18, 0, 0, 15),
    IpNet::v4(198, 51, 100, 0, 24),
    IpNet::v4(203, 0, 113, 0, 24),
    IpNet::v4(224, 0, 0, 0, 4),
    IpNet::v4(240, 0, 0, 0, 4),
    // RFC 4193
    IpNet::v6(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
    // RFC 4291
    IpNet::v6(Ipv6Addr::UNSPECIFIED, 128),
    IpNet::v6(Ipv6Addr::LOCALHOST, 128),
    IpNet::v6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
    IpNet::v6(Ipv6Addr::new(0xff00, 0, 0, 0, 0, 0, 0, 0), 8),
    IpNet::v6(Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0, 0), 96),
];

/// Immutable table of private and reserved networks
///
/// Built once during startup and shared by reference with every
/// component that evaluates checks.
#[derive(Debug, Clone)]
pub struct PrivateNetworks {
    networks: Vec<IpNet>,
}

impl Default for PrivateNetworks {
    fn default() -> Self {
        Self::new()
    }
}

impl PrivateNetworks {
    pub fn new() -> Self {
        Self {
            networks: RESERVED.to_vec(),
        }
    }

    pub fn networks(&self) -> &[IpNet] {
        &self.networks
    }

    /// True if the address lies in, or the network overlaps, any reserved block.
    pub fn is_private(&self, input: &str) -> Result<bool, InvalidNetwork> {
        let net: IpNet = input.trim().parse()?;
        Ok(self.networks.iter().any(|n| n.intersects(&net)))
    }
}
