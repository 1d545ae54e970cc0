//! The virtual network: addresses, the external transport, the virtual
//! segment and the topology tying them together.

mod address;
mod bvll;
pub mod mock;
mod router;
mod segment;
mod topology;
mod transport;

pub use address::{Address, DEFAULT_PORT, LocalAddress, Station};
pub use router::RouterNode;
pub use segment::{FIRST_PEER_MAC, MAX_PEERS, ROUTER_MAC, VirtualSegment};
pub use topology::{TopologyConfig, VirtualNetworkTopology};
pub use transport::{BipMode, Binding, Transport, UdpTransport};
