//! Topology construction against snapshot files.

use bacreplay::network::mock::{MockTransport, TransportOp};
use bacreplay::network::{Address, BipMode, TopologyConfig, Transport, VirtualNetworkTopology};
use bacreplay::value::PropertyValue;

use crate::common::fixtures::{SnapshotFixture, add_device};
use crate::common::init_test_logging;

fn config(device_ids: Vec<u32>) -> TopologyConfig {
    TopologyConfig {
        local_address: "192.168.0.10/24".parse().unwrap(),
        local_network: 10,
        vlan_network: 20,
        device_ids,
        bip_mode: BipMode::Simple,
    }
}

#[test]
fn devices_get_addresses_in_order() {
    init_test_logging();
    let fixture = SnapshotFixture::empty();
    let mut store = fixture.open();
    for id in [100, 200, 201] {
        add_device(&mut store, id, &format!("Device {id}"), 1);
    }

    let mock = MockTransport::new();
    let topology =
        VirtualNetworkTopology::build(&store, config(vec![100, 200, 201]), Box::new(mock.clone())).unwrap();

    assert_eq!(topology.router().device_id(), 100);
    assert_eq!(topology.mac_of(100), Some(1));
    assert_eq!(topology.mac_of(200), Some(2));
    assert_eq!(topology.mac_of(201), Some(3));
    assert_eq!(
        topology.node(2).map(|node| *node.address()),
        Some(Address::remote_mac(20, 2))
    );
    assert_eq!(topology.segment().len(), 2);
    assert!(mock.is_bound());
}

#[test]
fn router_only_network() {
    let fixture = SnapshotFixture::router_and_peer();
    let store = fixture.open();

    let topology =
        VirtualNetworkTopology::build(&store, config(vec![100]), Box::new(MockTransport::new())).unwrap();
    assert!(topology.segment().is_empty());
    assert_eq!(topology.vlan_network(), 20);
    assert_eq!(topology.local_network(), 10);
}

#[test]
fn missing_property_leaves_transport_unbound() {
    init_test_logging();
    let fixture = SnapshotFixture::router_and_peer();
    {
        let mut store = fixture.open();
        store
            .set("300", "device:300", "objectName", &PropertyValue::text("No Vendor"))
            .unwrap();
    }
    let store = fixture.open();

    let mock = MockTransport::new();
    let err = VirtualNetworkTopology::build(&store, config(vec![100, 200, 300]), Box::new(mock.clone()))
        .unwrap_err();

    assert_eq!(err.to_string(), "device 300: vendor identifier not found");
    assert!(!mock.is_bound());
    assert!(mock.operations().is_empty());
}

#[test]
fn unknown_device_is_a_configuration_error() {
    let fixture = SnapshotFixture::router_and_peer();
    let store = fixture.open();

    let mock = MockTransport::new();
    let err = VirtualNetworkTopology::build(&store, config(vec![100, 404]), Box::new(mock.clone()))
        .unwrap_err();
    assert_eq!(err.to_string(), "device 404: object name not found");
    assert!(mock.operations().is_empty());
}

#[test]
fn failed_bind_is_reported() {
    let fixture = SnapshotFixture::router_and_peer();
    let store = fixture.open();

    let result = VirtualNetworkTopology::build(
        &store,
        config(vec![100, 200]),
        Box::new(MockTransport::failing_bind()),
    );
    assert!(result.is_err());
}

#[test]
fn foreign_mode_binding_is_passed_through() {
    let fixture = SnapshotFixture::router_and_peer();
    let store = fixture.open();

    let mut config = config(vec![100]);
    config.bip_mode = BipMode::Foreign {
        bbmd: "192.168.1.1:47808".parse().unwrap(),
        ttl: 60,
    };
    let mock = MockTransport::new();
    let _topology = VirtualNetworkTopology::build(&store, config, Box::new(mock.clone())).unwrap();

    let binding = mock.binding().unwrap();
    assert_eq!(binding.network, 10);
    assert!(matches!(binding.mode, BipMode::Foreign { ttl: 60, .. }));
    mock.assert_operations(&[TransportOp::Bind { network: 10 }]);
}
