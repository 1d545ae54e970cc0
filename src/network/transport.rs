//! The router's binding to the external BACnet/IP network.
//!
//! The replay network only needs a narrow view of the link layer: bind once,
//! announce the routed segment, hand off traffic addressed beyond the segment,
//! and unbind at shutdown. [`Transport`] is that view; [`UdpTransport`] is
//! the production binding and [`MockTransport`](super::mock::MockTransport)
//! records calls for tests.

use std::fmt;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::address::{Address, LocalAddress, Station};
use super::bvll::{self, BvlcFunction};
use crate::error::{ReplayError, Result};
use crate::service::{IAm, Request, RequestError, Response};

/// BACnet/IP virtual link layer role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BipMode {
    /// Plain BACnet/IP node.
    #[default]
    Simple,
    /// Broadcast management device with a broadcast distribution table.
    Bbmd { peers: Vec<LocalAddress> },
    /// Foreign device registered with a remote BBMD.
    Foreign { bbmd: SocketAddrV4, ttl: u16 },
}

impl BipMode {
    /// How often a foreign registration is renewed: half the time-to-live,
    /// so one lost registration does not let the entry expire.
    pub fn renewal_interval(&self) -> Option<Duration> {
        match self {
            Self::Foreign { ttl, .. } => Some(Duration::from_secs(u64::from(ttl / 2).max(1))),
            Self::Simple | Self::Bbmd { .. } => None,
        }
    }
}

impl fmt::Display for BipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => f.write_str("simple"),
            Self::Bbmd { peers } => write!(f, "bbmd ({} peers)", peers.len()),
            Self::Foreign { bbmd, ttl } => write!(f, "foreign via {bbmd} (ttl {ttl}s)"),
        }
    }
}

/// Everything the transport needs to come up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub local: LocalAddress,
    pub network: u16,
    pub mode: BipMode,
}

/// External link used by the router node.
pub trait Transport: Send {
    /// Bind to the external network.
    fn bind(&mut self, binding: &Binding) -> Result<()>;

    fn is_bound(&self) -> bool;

    /// Release the binding. Calling this on an unbound transport does nothing.
    fn unbind(&mut self);

    /// Announce that the router reaches `networks`.
    fn announce_router(&mut self, networks: &[u16]) -> Result<()>;

    /// Deliver a confirmed request to a station beyond the segment.
    fn forward(&mut self, request: &Request) -> std::result::Result<Response, RequestError>;

    /// Send a Who-Is onto the external network.
    fn who_is(&mut self, destination: &Address, range: Option<(u32, u32)>) -> Result<()>;

    /// Send an I-Am onto the external network.
    fn i_am(&mut self, i_am: &IAm) -> Result<()>;

    /// How often [`maintain`](Self::maintain) must run while bound.
    fn maintenance_interval(&self) -> Option<Duration> {
        None
    }

    /// Periodic link upkeep, such as renewing a foreign registration.
    fn maintain(&mut self) -> Result<()> {
        Ok(())
    }
}

/// UDP binding to the local BACnet/IP network.
///
/// Sends the network layer messages the router originates. Broadcasts go to
/// the subnet broadcast address; a BBMD also forwards them to every peer in
/// its distribution table, and a foreign device hands them to its BBMD
/// instead.
#[derive(Debug, Default)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    binding: Option<Binding>,
}

impl UdpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active binding, if bound.
    pub const fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    /// The socket's actual address, if bound.
    pub fn local_addr(&self) -> Option<SocketAddrV4> {
        match self.socket.as_ref()?.local_addr().ok()? {
            SocketAddr::V4(addr) => Some(addr),
            SocketAddr::V6(_) => None,
        }
    }

    fn bound(&self) -> Result<(&UdpSocket, &Binding)> {
        match (&self.socket, &self.binding) {
            (Some(socket), Some(binding)) => Ok((socket, binding)),
            _ => Err(ReplayError::Transport("transport is not bound".to_string())),
        }
    }

    fn send(socket: &UdpSocket, frame: &[u8], to: SocketAddrV4) -> Result<()> {
        socket
            .send_to(frame, to)
            .map_err(|e| ReplayError::Transport(format!("send to {to} failed: {e}")))?;
        trace!(%to, len = frame.len(), "Frame sent");
        Ok(())
    }

    fn register_foreign_device(socket: &UdpSocket, bbmd: SocketAddrV4, ttl: u16) -> Result<()> {
        socket
            .send_to(&bvll::register_foreign_device(ttl), bbmd)
            .map_err(|e| ReplayError::Transport(format!("foreign device registration with {bbmd} failed: {e}")))?;
        debug!(%bbmd, ttl, "Registered as foreign device");
        Ok(())
    }

    fn unicast(&self, npdu: &[u8], to: SocketAddrV4) -> Result<()> {
        let (socket, _) = self.bound()?;
        Self::send(socket, &bvll::frame(BvlcFunction::OriginalUnicastNpdu, npdu), to)
    }

    fn broadcast(&self, npdu: &[u8]) -> Result<()> {
        let (socket, binding) = self.bound()?;

        if let BipMode::Foreign { bbmd, .. } = binding.mode {
            let frame = bvll::frame(BvlcFunction::DistributeBroadcastToNetwork, npdu);
            return Self::send(socket, &frame, bbmd);
        }

        let local = self.local_addr().unwrap_or(binding.local.socket);
        let subnet = LocalAddress::new(local, binding.local.prefix).broadcast();
        Self::send(socket, &bvll::frame(BvlcFunction::OriginalBroadcastNpdu, npdu), subnet)?;

        if let BipMode::Bbmd { peers } = &binding.mode {
            let frame = bvll::forwarded(local, npdu);
            for peer in peers {
                Self::send(socket, &frame, peer.broadcast())?;
            }
        }
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn bind(&mut self, binding: &Binding) -> Result<()> {
        if self.socket.is_some() {
            return Err(ReplayError::Transport("transport is already bound".to_string()));
        }

        let socket = UdpSocket::bind(binding.local.socket)
            .map_err(|e| ReplayError::Transport(format!("cannot bind {}: {e}", binding.local)))?;
        socket
            .set_broadcast(true)
            .map_err(|e| ReplayError::Transport(format!("cannot enable broadcast: {e}")))?;

        match &binding.mode {
            BipMode::Simple => {}
            BipMode::Bbmd { peers } => {
                for peer in peers {
                    debug!(peer = %peer, "Broadcast distribution table entry");
                }
            }
            BipMode::Foreign { bbmd, ttl } => Self::register_foreign_device(&socket, *bbmd, *ttl)?,
        }

        info!(
            local = %binding.local,
            network = binding.network,
            mode = %binding.mode,
            "Transport bound"
        );
        self.socket = Some(socket);
        self.binding = Some(binding.clone());
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.socket.is_some()
    }

    fn unbind(&mut self) {
        if self.socket.take().is_some() {
            info!("Transport unbound");
        }
        self.binding = None;
    }

    fn announce_router(&mut self, networks: &[u16]) -> Result<()> {
        self.broadcast(&bvll::i_am_router_to_network(networks))?;
        info!(?networks, "I-Am-Router-To-Network sent");
        Ok(())
    }

    fn forward(&mut self, request: &Request) -> std::result::Result<Response, RequestError> {
        warn!(
            service = request.service(),
            destination = %request.destination(),
            "Confirmed services are not carried to external stations"
        );
        Err(RequestError::unreachable(
            request.destination(),
            "external stations are not served by the replay transport",
        ))
    }

    fn who_is(&mut self, destination: &Address, range: Option<(u32, u32)>) -> Result<()> {
        let npdu = bvll::npdu(destination, &bvll::who_is(range));
        match destination {
            Address::Local(Station::Ip(addr)) => self.unicast(&npdu, *addr)?,
            Address::Local(Station::Mac(_)) => {
                return Err(ReplayError::Transport(format!(
                    "{destination} is not a BACnet/IP station"
                )));
            }
            _ => self.broadcast(&npdu)?,
        }
        debug!(%destination, ?range, "Who-Is sent");
        Ok(())
    }

    fn i_am(&mut self, i_am: &IAm) -> Result<()> {
        self.broadcast(&bvll::npdu(&Address::GlobalBroadcast, &bvll::i_am(i_am)))?;
        debug!(device = %i_am.device, "I-Am sent");
        Ok(())
    }

    fn maintenance_interval(&self) -> Option<Duration> {
        self.binding.as_ref()?.mode.renewal_interval()
    }

    fn maintain(&mut self) -> Result<()> {
        let (socket, binding) = self.bound()?;
        if let BipMode::Foreign { bbmd, ttl } = binding.mode {
            Self::register_foreign_device(socket, bbmd, ttl)?;
        }
        Ok(())
    }
}
