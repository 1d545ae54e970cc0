//! Network addresses.
//!
//! Two address spaces meet at the router: BACnet/IP stations on the external
//! network, identified by UDP socket address, and nodes on the virtual segment,
//! identified by a one-octet MAC. Request destinations use the console
//! notation:
//!
//! | Text              | Meaning                              |
//! |-------------------|--------------------------------------|
//! | `*`               | local broadcast                      |
//! | `*:*`             | global broadcast                     |
//! | `20:*`            | broadcast on network 20              |
//! | `20:2`            | station 2 on network 20              |
//! | `192.168.0.5`     | IP station on the local network      |
//! | `20:10.0.0.9:47809` | IP station on network 20           |

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReplayError;

/// Well-known BACnet/IP UDP port (0xBAC0).
pub const DEFAULT_PORT: u16 = 47808;

/// Station part of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Station {
    /// Node on the virtual segment.
    Mac(u8),
    /// BACnet/IP station.
    Ip(SocketAddrV4),
}

impl FromStr for Station {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(mac) = s.parse::<u8>() {
            return Ok(Self::Mac(mac));
        }
        parse_socket(s).map(Self::Ip)
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mac(mac) => write!(f, "{mac}"),
            Self::Ip(addr) if addr.port() == DEFAULT_PORT => write!(f, "{}", addr.ip()),
            Self::Ip(addr) => write!(f, "{addr}"),
        }
    }
}

/// Destination or source of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    /// Station on the directly connected network.
    Local(Station),
    /// Station on a numbered network.
    Remote { network: u16, station: Station },
    LocalBroadcast,
    RemoteBroadcast(u16),
    GlobalBroadcast,
}

impl Address {
    /// Station `mac` on network `network`.
    pub const fn remote_mac(network: u16, mac: u8) -> Self {
        Self::Remote {
            network,
            station: Station::Mac(mac),
        }
    }

    /// True for the three broadcast forms.
    pub const fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Self::LocalBroadcast | Self::RemoteBroadcast(_) | Self::GlobalBroadcast
        )
    }
}

impl FromStr for Address {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "*" => return Ok(Self::LocalBroadcast),
            "*:*" => return Ok(Self::GlobalBroadcast),
            _ => {}
        }

        if let Some((net, rest)) = s.split_once(':') {
            if let Ok(network) = net.parse::<u16>() {
                if rest == "*" {
                    return Ok(Self::RemoteBroadcast(network));
                }
                let station = rest
                    .parse::<Station>()
                    .map_err(|_| ReplayError::InvalidAddress(s.to_string()))?;
                return Ok(Self::Remote { network, station });
            }
        }

        s.parse::<Station>()
            .map(Self::Local)
            .map_err(|_| ReplayError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(station) => write!(f, "{station}"),
            Self::Remote { network, station } => write!(f, "{network}:{station}"),
            Self::LocalBroadcast => f.write_str("*"),
            Self::RemoteBroadcast(network) => write!(f, "{network}:*"),
            Self::GlobalBroadcast => f.write_str("*:*"),
        }
    }
}

/// The router's own BACnet/IP binding, `host[/prefix][:port]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAddress {
    pub socket: SocketAddrV4,
    pub prefix: u8,
}

impl LocalAddress {
    pub const fn new(socket: SocketAddrV4, prefix: u8) -> Self {
        Self { socket, prefix }
    }

    /// Directed broadcast address of the local subnet.
    pub fn broadcast(&self) -> SocketAddrV4 {
        let host_bits = u32::MAX.checked_shr(u32::from(self.prefix)).unwrap_or(0);
        let ip = u32::from(*self.socket.ip()) | host_bits;
        SocketAddrV4::new(Ipv4Addr::from(ip), self.socket.port())
    }

    /// The router's station address on the external network.
    pub const fn station(&self) -> Station {
        Station::Ip(self.socket)
    }
}

impl FromStr for LocalAddress {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ReplayError::InvalidAddress(s.to_string());

        let (host, prefix, port) = match s.split_once('/') {
            Some((host, tail)) => {
                let (prefix, port) = match tail.split_once(':') {
                    Some((prefix, port)) => (prefix, Some(port)),
                    None => (tail, None),
                };
                let prefix = prefix
                    .parse::<u8>()
                    .ok()
                    .filter(|p| *p <= 32)
                    .ok_or_else(invalid)?;
                (host, prefix, port)
            }
            None => (s, 32, None),
        };

        let socket = match port {
            Some(port) => {
                let ip = host.parse::<Ipv4Addr>().map_err(|_| invalid())?;
                let port = port.parse::<u16>().map_err(|_| invalid())?;
                SocketAddrV4::new(ip, port)
            }
            None => parse_socket(host).map_err(|_| invalid())?,
        };

        Ok(Self::new(socket, prefix))
    }
}

impl fmt::Display for LocalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.socket.ip(), self.prefix, self.socket.port())
    }
}

/// `a.b.c.d` or `a.b.c.d:port`.
fn parse_socket(s: &str) -> Result<SocketAddrV4, ReplayError> {
    if let Ok(ip) = s.parse::<Ipv4Addr>() {
        return Ok(SocketAddrV4::new(ip, DEFAULT_PORT));
    }
    s.parse::<SocketAddrV4>()
        .map_err(|_| ReplayError::InvalidAddress(s.to_string()))
}
