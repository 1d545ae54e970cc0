//! Requests through the event loop against a file-backed snapshot.

use std::time::Duration;

use bacreplay::network::mock::{MockTransport, TransportOp};
use bacreplay::network::{Address, BipMode, TopologyConfig, VirtualNetworkTopology};
use bacreplay::object::{ObjectId, ObjectType};
use bacreplay::service::{ErrorClass, ErrorCode, EventLoop, Request, RequestError, Response};
use bacreplay::store::SnapshotStore;
use bacreplay::value::PropertyValue;

use crate::common::fixtures::SnapshotFixture;
use crate::common::init_test_logging;

const WAIT: Duration = Duration::from_secs(5);

fn start(fixture: &SnapshotFixture, mock: &MockTransport) -> EventLoop {
    let store = SnapshotStore::open_read_only(fixture.path()).unwrap();
    let topology = VirtualNetworkTopology::build(
        &store,
        TopologyConfig {
            local_address: "192.168.0.10/24".parse().unwrap(),
            local_network: 10,
            vlan_network: 20,
            device_ids: vec![100, 200],
            bip_mode: BipMode::Simple,
        },
        Box::new(mock.clone()),
    )
    .unwrap();
    store.close().unwrap();
    EventLoop::new(topology).with_signals(false)
}

fn read(object: ObjectId, property: &str) -> Request {
    Request::ReadProperty {
        destination: Address::remote_mac(20, 2),
        object,
        property: property.to_string(),
        index: None,
    }
}

#[tokio::test]
async fn peer_reads_and_writes() {
    init_test_logging();
    let fixture = SnapshotFixture::router_and_peer();
    let mock = MockTransport::new();
    let event_loop = start(&fixture, &mock);
    let scheduler = event_loop.scheduler();
    let task = tokio::spawn(event_loop.run());

    let ai = ObjectId::new(ObjectType::AnalogInput, 0);

    let Ok(Response::ReadAck(ack)) = scheduler.request(read(ai, "presentValue")).wait_timeout(WAIT).await
    else {
        panic!("expected a read ack");
    };
    assert_eq!(ack.value, PropertyValue::Real(72.5));

    let written = scheduler
        .request(Request::WriteProperty {
            destination: Address::remote_mac(20, 2),
            object: ai,
            property: "presentValue".to_string(),
            value: PropertyValue::Real(68.0),
            index: None,
            priority: Some(16),
        })
        .wait_timeout(WAIT)
        .await;
    assert_eq!(written, Ok(Response::Ack));

    let Ok(Response::ReadAck(ack)) = scheduler.request(read(ai, "presentValue")).wait_timeout(WAIT).await
    else {
        panic!("expected a read ack");
    };
    assert_eq!(ack.value, PropertyValue::Real(68.0));

    let name = scheduler
        .request(Request::ReadProperty {
            destination: "192.168.0.10".parse().unwrap(),
            object: ObjectId::device(100),
            property: "objectName".to_string(),
            index: None,
        })
        .wait_timeout(WAIT)
        .await;
    assert!(matches!(name, Ok(Response::ReadAck(ack)) if ack.value == PropertyValue::text("Router")));

    scheduler.shutdown();
    let topology = task.await.unwrap();
    assert!(!topology.is_bound());

    // The snapshot file is never written back.
    let store = SnapshotStore::open_read_only(fixture.path()).unwrap();
    assert_eq!(
        store.get("200", "analog-input:0", "presentValue").unwrap(),
        Some(PropertyValue::Real(72.5))
    );
}

#[tokio::test]
async fn request_errors_stay_with_their_request() {
    let fixture = SnapshotFixture::router_and_peer();
    let mock = MockTransport::new();
    let event_loop = start(&fixture, &mock);
    let scheduler = event_loop.scheduler();
    let task = tokio::spawn(event_loop.run());

    let unknown_object = scheduler.request(read(ObjectId::new(ObjectType::AnalogInput, 9), "presentValue"));
    let unknown_property = scheduler.request(read(ObjectId::device(200), "nonsense"));
    let fine = scheduler.request(read(ObjectId::device(200), "objectName"));

    assert_eq!(
        unknown_object.wait_timeout(WAIT).await,
        Err(RequestError::error(ErrorClass::Object, ErrorCode::UnknownObject))
    );
    assert_eq!(
        unknown_property.wait_timeout(WAIT).await,
        Err(RequestError::property(ErrorCode::UnknownProperty))
    );
    assert!(matches!(fine.wait_timeout(WAIT).await, Ok(Response::ReadAck(_))));

    scheduler.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn who_is_reaches_segment_and_transport() {
    let fixture = SnapshotFixture::router_and_peer();
    let mock = MockTransport::new();
    let mut event_loop = start(&fixture, &mock);
    let mut indications = event_loop.indications();
    let scheduler = event_loop.scheduler();
    let task = tokio::spawn(event_loop.run());

    let sent = scheduler
        .request(Request::WhoIs {
            destination: Address::GlobalBroadcast,
            range: None,
        })
        .wait_timeout(WAIT)
        .await;
    assert_eq!(sent, Ok(Response::Sent));

    let i_am = indications.try_recv().unwrap();
    assert_eq!(i_am.device, ObjectId::device(200));
    assert_eq!(i_am.source, Address::remote_mac(20, 2));
    assert_eq!(i_am.vendor_id, 999);

    scheduler.shutdown();
    task.await.unwrap();

    let operations = mock.operations();
    assert_eq!(operations.first(), Some(&TransportOp::Bind { network: 10 }));
    assert_eq!(operations.get(1), Some(&TransportOp::AnnounceRouter { networks: vec![20] }));
    assert!(operations.contains(&TransportOp::WhoIs {
        destination: Address::GlobalBroadcast,
        range: None,
    }));
    assert_eq!(operations.last(), Some(&TransportOp::Unbind));
}
