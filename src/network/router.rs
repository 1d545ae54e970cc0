//! The router node: the one node bound to both the transport and the segment.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info};

use super::address::{Address, Station};
use super::transport::{Binding, Transport};
use crate::error::Result;
use crate::service::DeviceApplication;

/// Router node state.
pub struct RouterNode {
    app: DeviceApplication,
    transport: Box<dyn Transport>,
    binding: Binding,
    vlan_network: u16,
    /// Networks reached through another router, learned from `rtn`.
    routes: BTreeMap<u16, Address>,
}

impl RouterNode {
    /// Wrap an already bound transport.
    pub(crate) fn new(
        app: DeviceApplication,
        transport: Box<dyn Transport>,
        binding: Binding,
        vlan_network: u16,
    ) -> Self {
        Self {
            app,
            transport,
            binding,
            vlan_network,
            routes: BTreeMap::new(),
        }
    }

    pub const fn app(&self) -> &DeviceApplication {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut DeviceApplication {
        &mut self.app
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    pub fn is_bound(&self) -> bool {
        self.transport.is_bound()
    }

    pub const fn local_network(&self) -> u16 {
        self.binding.network
    }

    pub const fn binding(&self) -> &Binding {
        &self.binding
    }

    /// True if `station` is the router's own transport address.
    pub fn is_own_station(&self, station: &Station) -> bool {
        *station == self.binding.local.station()
    }

    /// Send I-Am-Router-To-Network for the virtual segment.
    pub fn announce(&mut self) -> Result<()> {
        info!(network = self.vlan_network, "Announcing route to virtual network");
        self.transport.announce_router(&[self.vlan_network])
    }

    /// How often the transport needs upkeep.
    pub fn maintenance_interval(&self) -> Option<Duration> {
        self.transport.maintenance_interval()
    }

    pub fn maintain(&mut self) -> Result<()> {
        self.transport.maintain()
    }

    /// Record that `router` reaches `networks`. Later entries replace earlier
    /// ones.
    pub fn update_router_references(&mut self, router: Address, networks: &[u16]) {
        for network in networks {
            debug!(network, %router, "Route learned");
            self.routes.insert(*network, router);
        }
    }

    pub fn route_to(&self, network: u16) -> Option<&Address> {
        self.routes.get(&network)
    }

    /// Networks learned through other routers.
    pub fn learned_networks(&self) -> impl Iterator<Item = u16> + '_ {
        self.routes.keys().copied()
    }

    pub fn close(&mut self) {
        self.transport.unbind();
    }
}

impl std::fmt::Debug for RouterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterNode")
            .field("device_id", &self.app.device_id())
            .field("binding", &self.binding)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}
