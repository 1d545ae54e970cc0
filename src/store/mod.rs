//! Snapshot storage for captured property values.
//!
//! Every captured value is one row keyed by device identifier, object
//! identifier and property identifier. Values are stored as versioned bincode
//! blobs so that a damaged or foreign row is reported rather than misread.
//!
//! # Usage
//!
//! ```ignore
//! use bacreplay::store::{SnapshotFilter, SnapshotStore};
//! use bacreplay::value::PropertyValue;
//!
//! let mut store = SnapshotStore::open("site.db")?;
//! store.set("100", "device:100", "objectName", &PropertyValue::text("Router"))?;
//!
//! for record in store.iterate(&SnapshotFilter::device("100"))? {
//!     let record = record?;
//!     println!("{} {}", record.key, record.value);
//! }
//! store.close()?;
//! ```

mod codec;
mod db;
mod schema;

pub use db::{SnapshotRows, SnapshotStore};
pub use schema::{SnapshotFilter, SnapshotKey, SnapshotRecord};
