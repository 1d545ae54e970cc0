//! Snapshot store tests against real database files.

use bacreplay::error::ReplayError;
use bacreplay::object::{ObjectId, ObjectType};
use bacreplay::store::{SnapshotFilter, SnapshotStore};
use bacreplay::value::{PropertyValue, Structured};
use chrono::{NaiveDate, NaiveTime};

use crate::common::fixtures::SnapshotFixture;
use crate::common::init_test_logging;

#[test]
fn values_survive_reopen() {
    init_test_logging();
    let fixture = SnapshotFixture::empty();

    let stamp = PropertyValue::Structured(
        Structured::new("DateTime")
            .with_field("date", PropertyValue::text("2020-03-01"))
            .with_field("time", PropertyValue::text("12:30:00")),
    );
    {
        let mut store = fixture.open();
        store.set("7", "device:7", "timeOfRestart", &stamp).unwrap();
        store.set("7", "binary-value:2", "presentValue", &PropertyValue::Enumerated(1)).unwrap();
        store.close().unwrap();
    }

    let store = SnapshotStore::open_read_only(fixture.path()).unwrap();
    assert_eq!(store.get("7", "device:7", "timeOfRestart").unwrap(), Some(stamp));
    assert_eq!(
        store.get("7", "binary-value:2", "presentValue").unwrap(),
        Some(PropertyValue::Enumerated(1))
    );
    assert_eq!(store.get("7", "binary-value:2", "description").unwrap(), None);
}

#[test]
fn nested_sequences_survive_reopen() {
    let fixture = SnapshotFixture::empty();

    let reference = |instance: u32| {
        PropertyValue::Structured(
            Structured::new("DeviceObjectPropertyReference")
                .with_field(
                    "objectIdentifier",
                    PropertyValue::ObjectIdentifier(ObjectId::new(ObjectType::AnalogValue, instance)),
                )
                .with_field("propertyIdentifier", PropertyValue::Enumerated(85))
                .with_field(
                    "arrayIndexes",
                    PropertyValue::List(vec![PropertyValue::Unsigned(1), PropertyValue::Unsigned(2)]),
                ),
        )
    };
    let references = PropertyValue::List(vec![reference(1), reference(2)]);
    let scalars = [
        ("effectivePeriod", PropertyValue::Date(NaiveDate::from_ymd_opt(2021, 6, 30).unwrap())),
        ("startTime", PropertyValue::Time(NaiveTime::from_hms_opt(6, 45, 30).unwrap())),
        ("macAddress", PropertyValue::OctetString(vec![0xC0, 0xA8, 0x00, 0x0A, 0xBA, 0xC0])),
        ("statusFlags", PropertyValue::BitString(vec![false, true, false, false])),
        ("scheduleDefault", PropertyValue::Double(-0.125)),
        ("objectIdentifier", PropertyValue::ObjectIdentifier(ObjectId::new(ObjectType::Schedule, 4))),
    ];
    {
        let mut store = fixture.open();
        store
            .set("7", "schedule:4", "listOfObjectPropertyReferences", &references)
            .unwrap();
        for (propid, value) in &scalars {
            store.set("7", "schedule:4", propid, value).unwrap();
        }
        store.close().unwrap();
    }

    let store = SnapshotStore::open_read_only(fixture.path()).unwrap();
    assert_eq!(
        store.get("7", "schedule:4", "listOfObjectPropertyReferences").unwrap(),
        Some(references)
    );
    for (propid, value) in scalars {
        assert_eq!(store.get("7", "schedule:4", propid).unwrap(), Some(value), "{propid}");
    }
}

#[test]
fn upsert_keeps_one_row() {
    let fixture = SnapshotFixture::empty();
    let mut store = fixture.open();

    for value in [1.0_f32, 2.0, 3.0] {
        store.set("1", "analog-value:1", "presentValue", &PropertyValue::Real(value)).unwrap();
    }

    assert_eq!(store.count(&SnapshotFilter::all()).unwrap(), 1);
    assert_eq!(
        store.get("1", "analog-value:1", "presentValue").unwrap(),
        Some(PropertyValue::Real(3.0))
    );
}

#[test]
fn filters_are_independent() {
    let fixture = SnapshotFixture::router_and_peer();
    let store = fixture.open();

    let by_property: Vec<_> = store
        .iterate(&SnapshotFilter::from_args("-", "-", "objectName"))
        .unwrap()
        .map(|r| r.unwrap().key)
        .collect();
    assert_eq!(by_property.len(), 3);
    assert!(by_property.iter().all(|key| key.propid == "objectName"));

    let by_object = store
        .count(&SnapshotFilter::from_args("-", "analog-input:0", "-"))
        .unwrap();
    assert_eq!(by_object, 3);

    let exact = store
        .count(&SnapshotFilter::device("200").object("analog-input:0").property("units"))
        .unwrap();
    assert_eq!(exact, 1);

    assert_eq!(store.count(&SnapshotFilter::device("999")).unwrap(), 0);
}

#[test]
fn missing_file_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nothing-here.db");

    let err = SnapshotStore::open_read_only(&missing).err().unwrap();
    assert!(matches!(err, ReplayError::StorageUnavailable { .. }));
    assert!(err.is_user_recoverable());
    assert!(!missing.exists());
}

#[test]
fn non_database_file_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.db");
    std::fs::write(&path, "this is not sqlite, just text that is long enough to have a header").unwrap();

    let err = SnapshotStore::open_read_only(&path).err().unwrap();
    assert!(matches!(err, ReplayError::StorageUnavailable { .. }));
}
