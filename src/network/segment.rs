//! The virtual segment peers live on.

use std::collections::BTreeMap;

use crate::service::DeviceApplication;

/// Segment MAC reserved for the router.
pub const ROUTER_MAC: u8 = 1;
/// First MAC handed to a peer.
pub const FIRST_PEER_MAC: u8 = 2;
/// Highest usable peer MAC; 255 is the segment broadcast.
pub const LAST_PEER_MAC: u8 = 254;
/// Peers one segment can hold.
pub const MAX_PEERS: usize = (LAST_PEER_MAC - FIRST_PEER_MAC + 1) as usize;

/// Peer nodes on the virtual segment, by MAC.
///
/// The router occupies [`ROUTER_MAC`] but is owned by the router node, not the
/// segment.
#[derive(Debug)]
pub struct VirtualSegment {
    network: u16,
    nodes: BTreeMap<u8, DeviceApplication>,
}

impl VirtualSegment {
    pub const fn new(network: u16) -> Self {
        Self {
            network,
            nodes: BTreeMap::new(),
        }
    }

    pub const fn network(&self) -> u16 {
        self.network
    }

    /// Attach a peer at `mac`. Returns the node back if the MAC is reserved
    /// or taken.
    pub fn attach(&mut self, mac: u8, node: DeviceApplication) -> Result<(), DeviceApplication> {
        if !(FIRST_PEER_MAC..=LAST_PEER_MAC).contains(&mac) || self.nodes.contains_key(&mac) {
            return Err(node);
        }
        self.nodes.insert(mac, node);
        Ok(())
    }

    pub fn node(&self, mac: u8) -> Option<&DeviceApplication> {
        self.nodes.get(&mac)
    }

    pub fn node_mut(&mut self, mac: u8) -> Option<&mut DeviceApplication> {
        self.nodes.get_mut(&mac)
    }

    /// Peers in MAC order.
    pub fn peers(&self) -> impl Iterator<Item = (u8, &DeviceApplication)> {
        self.nodes.iter().map(|(mac, node)| (*mac, node))
    }

    /// MAC of the peer serving `device_id`.
    pub fn mac_of(&self, device_id: u32) -> Option<u8> {
        self.peers()
            .find(|(_, node)| node.device_id() == device_id)
            .map(|(mac, _)| mac)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
