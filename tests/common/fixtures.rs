//! Snapshot database fixtures.
//!
//! Each fixture owns a temporary directory that is removed on drop.

use std::path::{Path, PathBuf};

use bacreplay::store::SnapshotStore;
use bacreplay::value::PropertyValue;
use tempfile::TempDir;

/// A snapshot database file in a temporary directory.
///
/// # Example
///
/// ```ignore
/// let snapshot = SnapshotFixture::router_and_peer();
/// let store = snapshot.open();
/// ```
pub struct SnapshotFixture {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl SnapshotFixture {
    /// An empty database.
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be created.
    #[must_use]
    pub fn empty() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join("snapshot.db");
        SnapshotStore::open(&path)
            .and_then(SnapshotStore::close)
            .expect("Failed to create snapshot database");
        Self { dir, path }
    }

    /// Router device 100 ("Router") and peer device 200 ("Peer") whose
    /// `analog-input:0` reads 72.5.
    #[must_use]
    pub fn router_and_peer() -> Self {
        let fixture = Self::empty();
        {
            let mut store = fixture.open();
            add_device(&mut store, 100, "Router", 999);
            add_device(&mut store, 200, "Peer", 999);
            store
                .set("200", "analog-input:0", "objectName", &PropertyValue::text("Zone Temp"))
                .unwrap();
            store
                .set("200", "analog-input:0", "presentValue", &PropertyValue::Real(72.5))
                .unwrap();
            store
                .set("200", "analog-input:0", "units", &PropertyValue::Enumerated(64))
                .unwrap();
            store
                .set(
                    "200",
                    "device:200",
                    "objectList",
                    &PropertyValue::List(vec![
                        PropertyValue::text("device:200"),
                        PropertyValue::text("analog-input:0"),
                    ]),
                )
                .unwrap();
        }
        fixture
    }

    /// Open the database for writing.
    #[must_use]
    pub fn open(&self) -> SnapshotStore {
        SnapshotStore::open(&self.path).expect("Failed to open snapshot database")
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn path_str(&self) -> &str {
        self.path.to_str().expect("temp path is not UTF-8")
    }
}

/// Write the two mandatory device properties.
pub fn add_device(store: &mut SnapshotStore, id: u32, name: &str, vendor: u64) {
    let devid = id.to_string();
    let objid = format!("device:{id}");
    store
        .set(&devid, &objid, "objectName", &PropertyValue::text(name))
        .unwrap();
    store
        .set(&devid, &objid, "vendorIdentifier", &PropertyValue::Unsigned(vendor))
        .unwrap();
}
