//! Device model rebuilding from snapshot files.

use bacreplay::model::DeviceModelBuilder;
use bacreplay::object::{ObjectId, ObjectType};
use bacreplay::value::PropertyValue;

use crate::common::fixtures::{SnapshotFixture, add_device};

#[test]
fn peer_model_has_its_objects() {
    let fixture = SnapshotFixture::router_and_peer();
    let store = fixture.open();

    let model = DeviceModelBuilder::new(&store).build(200).unwrap();
    assert_eq!(model.device_id(), 200);
    assert_eq!(model.device().object_name(), "Peer");
    assert_eq!(model.device().vendor_identifier(), 999);

    let ai = ObjectId::new(ObjectType::AnalogInput, 0);
    let object = model.object(&ai).unwrap();
    assert_eq!(object.get("presentValue"), Some(&PropertyValue::Real(72.5)));
    assert_eq!(object.get("objectName"), Some(&PropertyValue::text("Zone Temp")));
}

#[test]
fn stored_object_list_is_replaced() {
    let fixture = SnapshotFixture::router_and_peer();
    let store = fixture.open();
    let model = DeviceModelBuilder::new(&store).build(200).unwrap();

    // The stored list holds strings; the served one is computed from the model.
    let list = model
        .read_property(&ObjectId::device(200), "objectList", None)
        .unwrap();
    assert_eq!(
        list,
        PropertyValue::List(vec![
            PropertyValue::ObjectIdentifier(ObjectId::device(200)),
            PropertyValue::ObjectIdentifier(ObjectId::new(ObjectType::AnalogInput, 0)),
        ])
    );
}

#[test]
fn missing_vendor_names_the_device() {
    let fixture = SnapshotFixture::empty();
    let mut store = fixture.open();
    store
        .set("300", "device:300", "objectName", &PropertyValue::text("Orphan"))
        .unwrap();

    let err = DeviceModelBuilder::new(&store).build(300).unwrap_err();
    assert_eq!(err.to_string(), "device 300: vendor identifier not found");
}

#[test]
fn bad_object_value_names_device_and_object() {
    let fixture = SnapshotFixture::empty();
    let mut store = fixture.open();
    add_device(&mut store, 5, "Bad", 1);
    store
        .set("5", "analog-input:3", "presentValue", &PropertyValue::text("warm"))
        .unwrap();

    let message = DeviceModelBuilder::new(&store).build(5).unwrap_err().to_string();
    assert!(message.starts_with("device 5: object analog-input:3"), "{message}");
}
