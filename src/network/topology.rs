//! Address assignment and request routing for the replay network.
//!
//! ```text
//!   external BACnet/IP network (local_network)
//!        |
//!   [transport] -- router node (first device id)
//!                     | MAC 1
//!   ==================+=========+=========+====  virtual segment (vlan_network)
//!                               | MAC 2   | MAC 3
//!                             peer      peer
//! ```

use std::time::Duration;

use tracing::{debug, info, instrument, trace, warn};

use super::address::{Address, LocalAddress, Station};
use super::router::RouterNode;
use super::segment::{FIRST_PEER_MAC, LAST_PEER_MAC, MAX_PEERS, ROUTER_MAC, VirtualSegment};
use super::transport::{BipMode, Binding, Transport};
use crate::error::{ReplayError, Result};
use crate::model::DeviceModelBuilder;
use crate::service::{DeviceApplication, IAm, Request, RequestError, Response};
use crate::store::SnapshotStore;

/// What the topology is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyConfig {
    /// Router's own BACnet/IP address.
    pub local_address: LocalAddress,
    /// Network number of the external network.
    pub local_network: u16,
    /// Network number of the virtual segment.
    pub vlan_network: u16,
    /// First entry is the router device, the rest are peers.
    pub device_ids: Vec<u32>,
    pub bip_mode: BipMode,
}

impl TopologyConfig {
    fn validate(&self) -> Result<()> {
        if self.device_ids.is_empty() {
            return Err(ReplayError::configuration("at least one device identifier is required"));
        }
        if self.device_ids.len() - 1 > MAX_PEERS {
            return Err(ReplayError::configuration(format!(
                "{} peer devices requested, the virtual segment holds at most {MAX_PEERS}",
                self.device_ids.len() - 1
            )));
        }
        for (name, network) in [("local", self.local_network), ("virtual", self.vlan_network)] {
            if network == 0 || network == u16::MAX {
                return Err(ReplayError::configuration(format!(
                    "{name} network number {network} is out of range (1-65534)"
                )));
            }
        }
        if self.local_network == self.vlan_network {
            return Err(ReplayError::configuration(format!(
                "local and virtual networks must differ (both are {})",
                self.local_network
            )));
        }
        for (i, id) in self.device_ids.iter().enumerate() {
            if self.device_ids[..i].contains(id) {
                return Err(ReplayError::configuration(format!("device {id} is listed more than once")));
            }
        }
        Ok(())
    }
}

/// Where a request ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Router,
    Peer(u8),
    External,
}

/// The running replay network.
///
/// Built all-or-nothing: every device model is rebuilt before the transport is
/// bound, so a configuration error never leaves a bound node behind.
#[derive(Debug)]
pub struct VirtualNetworkTopology {
    router: RouterNode,
    segment: VirtualSegment,
    indications: Vec<IAm>,
    closed: bool,
}

impl VirtualNetworkTopology {
    /// Build the router and peers from `store` and bind the router to
    /// `transport`.
    #[instrument(skip_all, fields(devices = ?config.device_ids))]
    pub fn build(
        store: &SnapshotStore,
        config: TopologyConfig,
        mut transport: Box<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;

        let builder = DeviceModelBuilder::new(store);
        let models = config
            .device_ids
            .iter()
            .map(|&device_id| builder.build(device_id))
            .collect::<Result<Vec<_>>>()?;
        let mut models = models.into_iter();

        let Some(router_model) = models.next() else {
            return Err(ReplayError::configuration("at least one device identifier is required"));
        };
        let router_app = DeviceApplication::new(Address::Local(config.local_address.station()), router_model);

        let mut segment = VirtualSegment::new(config.vlan_network);
        for (model, mac) in models.zip(FIRST_PEER_MAC..=LAST_PEER_MAC) {
            let device_id = model.device_id();
            let app = DeviceApplication::new(Address::remote_mac(config.vlan_network, mac), model);
            segment
                .attach(mac, app)
                .map_err(|_| ReplayError::configuration(format!("device {device_id}: segment address {mac} unavailable")))?;
            debug!(device_id, mac, "Peer attached");
        }

        let binding = Binding {
            local: config.local_address,
            network: config.local_network,
            mode: config.bip_mode,
        };
        transport.bind(&binding)?;

        let router = RouterNode::new(router_app, transport, binding, config.vlan_network);
        info!(
            router = router.app().device_id(),
            peers = segment.len(),
            network = config.vlan_network,
            "Virtual network ready"
        );

        Ok(Self {
            router,
            segment,
            indications: Vec::new(),
            closed: false,
        })
    }

    pub const fn router(&self) -> &DeviceApplication {
        self.router.app()
    }

    pub const fn segment(&self) -> &VirtualSegment {
        &self.segment
    }

    pub const fn vlan_network(&self) -> u16 {
        self.segment.network()
    }

    pub const fn local_network(&self) -> u16 {
        self.router.local_network()
    }

    /// Node at segment MAC `mac`; MAC 1 is the router.
    pub fn node(&self, mac: u8) -> Option<&DeviceApplication> {
        if mac == ROUTER_MAC {
            Some(self.router.app())
        } else {
            self.segment.node(mac)
        }
    }

    /// Segment MAC of the node serving `device_id`.
    pub fn mac_of(&self, device_id: u32) -> Option<u8> {
        if self.router.app().device_id() == device_id {
            Some(ROUTER_MAC)
        } else {
            self.segment.mac_of(device_id)
        }
    }

    pub fn is_bound(&self) -> bool {
        self.router.is_bound()
    }

    /// Tell the external network the router reaches the virtual segment.
    ///
    /// Runs as a deferred task once the event loop has started.
    pub fn announce(&mut self) -> Result<()> {
        if self.closed {
            return Err(ReplayError::Transport("network is closed".to_string()));
        }
        self.router.announce()
    }

    /// How often [`maintain`](Self::maintain) must run, if ever.
    pub fn maintenance_interval(&self) -> Option<Duration> {
        self.router.maintenance_interval()
    }

    /// Transport upkeep, run on a timer by the event loop.
    pub fn maintain(&mut self) -> Result<()> {
        if self.closed {
            return Err(ReplayError::Transport("network is closed".to_string()));
        }
        self.router.maintain()
    }

    /// Record networks reachable through `router`.
    pub fn update_router_references(&mut self, router: Address, networks: &[u16]) {
        self.router.update_router_references(router, networks);
    }

    /// I-Am indications received since the last call.
    pub fn take_indications(&mut self) -> Vec<IAm> {
        std::mem::take(&mut self.indications)
    }

    /// Route one request from the router's application.
    #[instrument(skip_all, fields(service = request.service(), destination = %request.destination()))]
    pub fn request(&mut self, request: &Request) -> std::result::Result<Response, RequestError> {
        if self.closed {
            return Err(RequestError::Abort("network is closed".to_string()));
        }

        match request {
            Request::ReadProperty { .. } | Request::WriteProperty { .. } => self.confirmed(request),
            Request::WhoIs { destination, range } => self.who_is(destination, *range),
            Request::IAm { destination } => self.i_am(destination),
        }
    }

    /// Unbind the transport. Further requests are aborted.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.router.close();
            info!("Virtual network closed");
        }
    }

    fn confirmed(&mut self, request: &Request) -> std::result::Result<Response, RequestError> {
        let destination = request.destination();
        if destination.is_broadcast() {
            return Err(RequestError::Malformed(format!(
                "{} cannot be broadcast",
                request.service()
            )));
        }

        match self.resolve(destination)? {
            Target::Router => self.router.app_mut().confirmation(request),
            Target::Peer(mac) => self
                .segment
                .node_mut(mac)
                .ok_or_else(|| RequestError::unreachable(destination, "no node at that segment address"))?
                .confirmation(request),
            Target::External => {
                trace!("Forwarding to transport");
                self.router.transport_mut().forward(request)
            }
        }
    }

    fn who_is(
        &mut self,
        destination: &Address,
        range: Option<(u32, u32)>,
    ) -> std::result::Result<Response, RequestError> {
        let vlan = self.vlan_network();
        let local = self.local_network();

        let (segment, external) = match *destination {
            Address::GlobalBroadcast => (true, true),
            Address::RemoteBroadcast(network) if network == vlan => (true, false),
            Address::RemoteBroadcast(network)
                if network == local || self.router.route_to(network).is_some() =>
            {
                (false, true)
            }
            Address::RemoteBroadcast(network) => return Err(RequestError::NoRoute(network)),
            Address::LocalBroadcast => (false, true),
            Address::Local(_) | Address::Remote { .. } => {
                match self.resolve(destination)? {
                    Target::Router => {
                        let answer = self.router.app().who_is(range);
                        self.indications.extend(answer);
                    }
                    Target::Peer(mac) => {
                        let answer = self.segment.node(mac).and_then(|node| node.who_is(range));
                        self.indications.extend(answer);
                    }
                    Target::External => {
                        self.router
                            .transport_mut()
                            .who_is(destination, range)
                            .map_err(|e| RequestError::unreachable(destination, e.to_string()))?;
                    }
                }
                return Ok(Response::Sent);
            }
        };

        if segment {
            let answers: Vec<IAm> = self
                .segment
                .peers()
                .filter_map(|(_, node)| node.who_is(range))
                .collect();
            debug!(answers = answers.len(), "Who-Is answered on the virtual segment");
            self.indications.extend(answers);
        }
        if external {
            if let Err(e) = self.router.transport_mut().who_is(destination, range) {
                warn!(error = %e, "Who-Is not sent to the external network");
            }
        }
        Ok(Response::Sent)
    }

    fn i_am(&mut self, destination: &Address) -> std::result::Result<Response, RequestError> {
        let i_am = self.router.app().i_am();
        let vlan = self.vlan_network();

        let segment_only = match destination {
            Address::RemoteBroadcast(network) => *network == vlan,
            Address::Remote { network, .. } => *network == vlan,
            _ => false,
        };
        if segment_only {
            trace!("I-Am delivered on the virtual segment");
            return Ok(Response::Sent);
        }

        self.router
            .transport_mut()
            .i_am(&i_am)
            .map_err(|e| RequestError::unreachable(destination, e.to_string()))?;
        Ok(Response::Sent)
    }

    fn resolve(&self, destination: &Address) -> std::result::Result<Target, RequestError> {
        let vlan = self.vlan_network();

        match *destination {
            Address::Remote {
                network,
                station: Station::Mac(mac),
            } if network == vlan => {
                if mac == ROUTER_MAC {
                    Ok(Target::Router)
                } else if self.segment.node(mac).is_some() {
                    Ok(Target::Peer(mac))
                } else {
                    Err(RequestError::unreachable(destination, "no node at that segment address"))
                }
            }
            Address::Remote { network, .. } if network == vlan => Err(RequestError::unreachable(
                destination,
                "virtual segment stations use one-octet addresses",
            )),
            Address::Remote { network, station } if network == self.local_network() => {
                self.resolve_local(destination, &station)
            }
            Address::Remote { network, .. } => {
                if self.router.route_to(network).is_some() {
                    Ok(Target::External)
                } else {
                    Err(RequestError::NoRoute(network))
                }
            }
            Address::Local(station) => self.resolve_local(destination, &station),
            Address::LocalBroadcast | Address::RemoteBroadcast(_) | Address::GlobalBroadcast => {
                Err(RequestError::Malformed(format!("{destination} is a broadcast address")))
            }
        }
    }

    fn resolve_local(
        &self,
        destination: &Address,
        station: &Station,
    ) -> std::result::Result<Target, RequestError> {
        match station {
            Station::Ip(_) if self.router.is_own_station(station) => Ok(Target::Router),
            Station::Ip(_) => Ok(Target::External),
            Station::Mac(_) => Err(RequestError::unreachable(
                destination,
                format!("virtual segment nodes are addressed as {}:N", self.vlan_network()),
            )),
        }
    }
}

impl Drop for VirtualNetworkTopology {
    fn drop(&mut self) {
        self.close();
    }
}
