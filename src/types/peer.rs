use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};

/// Service bit advertised by peers that relay full blocks.
pub const SERVICES_NODE_NETWORK: u64 = 0x01;

/// A known peer node. Addresses are stored as IPv6 (IPv4 peers are v4-mapped).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInfo {
    pub address: Ipv6Addr,
    pub port: u16,
    pub timestamp: u64,
    pub services: u64,
}

impl PeerInfo {
    pub fn new(address: IpAddr, port: u16, timestamp: u64) -> Self {
        let address = match address {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        Self {
            address,
            port,
            timestamp,
            services: SERVICES_NODE_NETWORK,
        }
    }

    /// The address as it should be dialed: plain IPv4 for mapped addresses.
    pub fn ip(&self) -> IpAddr {
        match self.address.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(self.address),
        }
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip() {
            IpAddr::V4(v4) => write!(f, "{}:{}", v4, self.port),
            IpAddr::V6(v6) => write!(f, "[{}]:{}", v6, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn ipv4_peers_are_mapped_and_unmapped() {
        let peer = PeerInfo::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), 20866, 5);
        assert_eq!(peer.address.segments()[5], 0xffff);
        assert_eq!(peer.ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(peer.to_string(), "10.0.0.7:20866");
    }
}
