//! SQLite database operations for snapshot storage.
//!
//! One table holds every captured property value, keyed by
//! `(devid, objid, propid)` with a primary key constraint on the triple.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info, instrument, trace};

use super::codec;
use super::schema::{SnapshotFilter, SnapshotKey, SnapshotRecord};
use crate::error::{ReplayError, Result};
use crate::value::PropertyValue;

/// SQLite schema for snapshot storage.
const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS snapshot (
    devid TEXT NOT NULL,
    objid TEXT NOT NULL,
    propid TEXT NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (devid, objid, propid)
);
";

/// How long a writer waits on a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent snapshot store.
///
/// Closing consumes the store, so use after close cannot compile.
pub struct SnapshotStore {
    conn: Connection,
}

impl SnapshotStore {
    /// Opens or creates a store at the given path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening snapshot database");
        let conn = Connection::open(path).map_err(|e| unavailable(path, &e))?;
        Self::init(conn, path, true)
    }

    /// Opens an existing store without creating it.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening snapshot database read-only");
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| unavailable(path, &e))?;
        Self::init(conn, path, false)
    }

    /// Creates an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| unavailable(Path::new(":memory:"), &e))?;
        Self::init(conn, Path::new(":memory:"), true)
    }

    fn init(conn: Connection, path: &Path, writable: bool) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| unavailable(path, &e))?;

        if writable {
            conn.execute_batch(SCHEMA_SQL)
                .map_err(|e| unavailable(path, &e))?;
        } else {
            // A read-only handle cannot create the table; probe it instead so a
            // non-database file is reported at open time.
            conn.query_row("SELECT count(*) FROM snapshot", [], |row| row.get::<_, i64>(0))
                .map_err(|e| unavailable(path, &e))?;
        }

        info!(path = %path.display(), writable, "Snapshot database ready");
        Ok(Self { conn })
    }

    /// Looks up one value; `Ok(None)` if the key was never written.
    #[instrument(skip(self))]
    pub fn get(&self, devid: &str, objid: &str, propid: &str) -> Result<Option<PropertyValue>> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT value FROM snapshot WHERE (devid = ?1) AND (objid = ?2) AND (propid = ?3)",
                params![devid, objid, propid],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ReplayError::Store(format!("Failed to query value: {e}")))?;

        let Some(blob) = blob else {
            trace!("Value not found");
            return Ok(None);
        };

        codec::decode(&blob)
            .map(Some)
            .map_err(|reason| ReplayError::CorruptRecord {
                key: SnapshotKey::new(devid, objid, propid).to_string(),
                reason,
            })
    }

    /// Inserts or replaces one value.
    ///
    /// The insert-or-update decision is a single `ON CONFLICT` statement inside
    /// an immediate transaction, so racing writers never duplicate a row.
    #[instrument(skip(self, value))]
    pub fn set(&mut self, devid: &str, objid: &str, propid: &str, value: &PropertyValue) -> Result<()> {
        let blob = codec::encode(value).map_err(|reason| ReplayError::CorruptRecord {
            key: SnapshotKey::new(devid, objid, propid).to_string(),
            reason,
        })?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| ReplayError::Store(format!("Failed to start transaction: {e}")))?;

        tx.execute(
            "INSERT INTO snapshot (devid, objid, propid, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (devid, objid, propid) DO UPDATE SET value = excluded.value",
            params![devid, objid, propid, blob],
        )
        .map_err(|e| ReplayError::Store(format!("Failed to store value: {e}")))?;

        tx.commit()
            .map_err(|e| ReplayError::Store(format!("Failed to commit transaction: {e}")))?;

        trace!(bytes = blob.len(), "Value stored");
        Ok(())
    }

    /// Convenience wrapper over [`set`](Self::set) taking a key.
    pub fn set_key(&mut self, key: &SnapshotKey, value: &PropertyValue) -> Result<()> {
        self.set(&key.devid, &key.objid, &key.propid, value)
    }

    /// Returns the rows matching `filter`, in insertion order.
    ///
    /// Rows are read from the database when this is called; values are decoded
    /// lazily as the iterator advances.
    #[instrument(skip(self))]
    pub fn iterate(&self, filter: &SnapshotFilter) -> Result<SnapshotRows> {
        let (where_sql, args) = filter.where_clause();
        let sql = format!("SELECT devid, objid, propid, value FROM snapshot{where_sql} ORDER BY rowid");

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| ReplayError::Store(format!("Failed to prepare statement: {e}")))?;

        let rows = stmt
            .query_map(rusqlite::params_from_iter(args), |row| {
                Ok((
                    SnapshotKey {
                        devid: row.get(0)?,
                        objid: row.get(1)?,
                        propid: row.get(2)?,
                    },
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })
            .map_err(|e| ReplayError::Store(format!("Failed to query rows: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ReplayError::Store(format!("Failed to collect rows: {e}")))?;

        debug!(count = rows.len(), "Rows selected");
        Ok(SnapshotRows { rows, position: 0 })
    }

    /// Number of rows matching `filter`.
    pub fn count(&self, filter: &SnapshotFilter) -> Result<usize> {
        let (where_sql, args) = filter.where_clause();
        let sql = format!("SELECT count(*) FROM snapshot{where_sql}");
        let count: i64 = self
            .conn
            .query_row(&sql, rusqlite::params_from_iter(args), |row| row.get(0))
            .map_err(|e| ReplayError::Store(format!("Failed to count rows: {e}")))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Distinct device identifiers, in first-insertion order.
    pub fn device_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT devid FROM snapshot GROUP BY devid ORDER BY min(rowid)")
            .map_err(|e| ReplayError::Store(format!("Failed to prepare statement: {e}")))?;

        stmt.query_map([], |row| row.get(0))
            .map_err(|e| ReplayError::Store(format!("Failed to query devices: {e}")))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| ReplayError::Store(format!("Failed to collect devices: {e}")))
    }

    /// Releases the database connection.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| ReplayError::Store(format!("Failed to close database: {e}")))?;
        debug!("Snapshot database closed");
        Ok(())
    }
}

/// Rows selected by [`SnapshotStore::iterate`].
///
/// Cloning yields an independent iterator over the same rows, so a selection
/// can be walked more than once.
#[derive(Debug, Clone)]
pub struct SnapshotRows {
    rows: Vec<(SnapshotKey, Vec<u8>)>,
    position: usize,
}

impl SnapshotRows {
    /// Restart iteration from the first row.
    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl Iterator for SnapshotRows {
    type Item = Result<SnapshotRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, blob) = self.rows.get(self.position)?;
        self.position += 1;

        Some(match codec::decode(blob) {
            Ok(value) => Ok(SnapshotRecord {
                key: key.clone(),
                value,
            }),
            Err(reason) => Err(ReplayError::CorruptRecord {
                key: key.to_string(),
                reason,
            }),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.rows.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SnapshotRows {}

fn unavailable(path: &Path, err: &rusqlite::Error) -> ReplayError {
    ReplayError::StorageUnavailable {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_row_count(store: &SnapshotStore) -> i64 {
        store
            .conn
            .query_row("SELECT count(*) FROM snapshot", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_create_database() {
        let store = SnapshotStore::in_memory().unwrap();
        assert_eq!(store.count(&SnapshotFilter::all()).unwrap(), 0);
    }

    #[test]
    fn test_get_absent_key() {
        let store = SnapshotStore::in_memory().unwrap();
        assert_eq!(store.get("1", "device:1", "objectName").unwrap(), None);
    }

    #[test]
    fn test_upsert_replaces_value() {
        let mut store = SnapshotStore::in_memory().unwrap();
        store.set("1", "device:1", "objectName", &PropertyValue::text("a")).unwrap();
        store.set("1", "device:1", "objectName", &PropertyValue::text("b")).unwrap();

        assert_eq!(raw_row_count(&store), 1);
        assert_eq!(
            store.get("1", "device:1", "objectName").unwrap(),
            Some(PropertyValue::text("b"))
        );
    }

    #[test]
    fn test_corrupt_blob_is_reported() {
        let store = SnapshotStore::in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO snapshot VALUES ('1', 'device:1', 'objectName', ?1)",
                params![vec![0x80_u8, 0x03, 0x58]],
            )
            .unwrap();

        let err = store.get("1", "device:1", "objectName").unwrap_err();
        assert!(matches!(err, ReplayError::CorruptRecord { .. }));

        let mut rows = store.iterate(&SnapshotFilter::all()).unwrap();
        assert!(matches!(rows.next(), Some(Err(ReplayError::CorruptRecord { .. }))));
    }

    #[test]
    fn test_rows_are_restartable() {
        let mut store = SnapshotStore::in_memory().unwrap();
        store.set("1", "device:1", "objectName", &PropertyValue::text("a")).unwrap();
        store.set("1", "device:1", "vendorIdentifier", &PropertyValue::Unsigned(15)).unwrap();

        let mut rows = store.iterate(&SnapshotFilter::all()).unwrap();
        let snapshot = rows.clone();
        assert_eq!(rows.by_ref().count(), 2);
        assert_eq!(rows.next().map(|r| r.is_ok()), None);

        rows.rewind();
        assert_eq!(rows.len(), 2);
        assert_eq!(snapshot.count(), 2);
    }

    #[test]
    fn test_iteration_is_not_a_live_view() {
        let mut store = SnapshotStore::in_memory().unwrap();
        store.set("1", "device:1", "objectName", &PropertyValue::text("a")).unwrap();

        let rows = store.iterate(&SnapshotFilter::all()).unwrap();
        store.set("1", "device:1", "location", &PropertyValue::text("roof")).unwrap();

        assert_eq!(rows.count(), 1);
    }

    #[test]
    fn test_device_ids_in_insertion_order() {
        let mut store = SnapshotStore::in_memory().unwrap();
        store.set("200", "device:200", "objectName", &PropertyValue::text("b")).unwrap();
        store.set("100", "device:100", "objectName", &PropertyValue::text("a")).unwrap();
        store.set("200", "device:200", "vendorIdentifier", &PropertyValue::Unsigned(1)).unwrap();

        assert_eq!(store.device_ids().unwrap(), vec!["200", "100"]);
    }

    #[test]
    fn test_close() {
        let store = SnapshotStore::in_memory().unwrap();
        store.close().unwrap();
    }
}
