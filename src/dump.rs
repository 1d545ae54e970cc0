//! Printing snapshot contents.
//!
//! One line per scalar record, `devid objid propid value`. List values get a
//! header line followed by one `    [i]: value` line per element, and
//! constructed values get a header line followed by their inspection form.

use std::io::{self, Write};

use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{ReplayError, Result};
use crate::store::{SnapshotFilter, SnapshotRecord, SnapshotStore};
use crate::value::PropertyValue;

/// Indent of a top-level inspection block.
const CONTENTS_INDENT: usize = 1;

/// Indent of an inspection block under a list element.
const ELEMENT_CONTENTS_INDENT: usize = 4;

/// Row count for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub devid: String,
    pub rows: usize,
}

/// Write one record in dump format.
pub fn write_record(out: &mut dyn Write, record: &SnapshotRecord) -> io::Result<()> {
    let key = &record.key;
    let header = format!("{} {} {}", key.devid, key.objid, key.propid);

    match &record.value {
        value if value.has_debug_contents() => {
            writeln!(out, "{header}")?;
            value.debug_contents(out, CONTENTS_INDENT)
        }
        PropertyValue::List(items) => {
            writeln!(out, "{header}")?;
            for (i, item) in items.iter().enumerate() {
                writeln!(out, "    [{i}]: {item}")?;
                if item.has_debug_contents() {
                    item.debug_contents(out, ELEMENT_CONTENTS_INDENT)?;
                }
            }
            Ok(())
        }
        value => writeln!(out, "{header} {value}"),
    }
}

/// Write every record matching `filter`, in store order. Returns the number
/// of records written.
#[instrument(skip(store, out))]
pub fn dump(store: &SnapshotStore, filter: &SnapshotFilter, out: &mut dyn Write) -> Result<usize> {
    let mut written = 0;
    for record in store.iterate(filter)? {
        write_record(out, &record?)?;
        written += 1;
    }
    out.flush()?;
    debug!(written, "Dump complete");
    Ok(written)
}

/// Collect the records matching `filter`, decoded.
pub fn records(store: &SnapshotStore, filter: &SnapshotFilter) -> Result<Vec<SnapshotRecord>> {
    store.iterate(filter)?.collect()
}

/// Row counts per device, in first-insertion order.
pub fn summarize(store: &SnapshotStore) -> Result<Vec<DeviceSummary>> {
    store
        .device_ids()?
        .into_iter()
        .map(|devid| {
            let rows = store.count(&SnapshotFilter::device(devid.as_str()))?;
            Ok(DeviceSummary { devid, rows })
        })
        .collect()
}

/// Write a summary table.
pub fn write_summary(out: &mut dyn Write, summary: &[DeviceSummary]) -> Result<()> {
    let width = summary.iter().map(|s| s.devid.len()).max().unwrap_or(0).max(6);
    writeln!(out, "{:<width$}  rows", "device")?;
    for entry in summary {
        writeln!(out, "{:<width$}  {}", entry.devid, entry.rows)?;
    }
    let total: usize = summary.iter().map(|s| s.rows).sum();
    writeln!(out, "{} devices, {total} rows", summary.len())?;
    out.flush().map_err(ReplayError::from)
}
