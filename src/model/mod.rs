//! Rebuilding device models from snapshot rows.
//!
//! A device's rows split into two groups: rows under its own `device:<id>`
//! object, which become the [`DeviceDescriptor`], and rows under any other
//! object identifier, which are grouped per identifier and constructed into
//! [`ObjectInstance`]s through the per-type property tables.

mod device;
mod object;

pub use device::{DERIVED_DEVICE_PROPERTIES, DeviceDescriptor, DeviceModel};
pub use object::{ConstructError, ObjectInstance, Property};

use std::collections::HashMap;

use tracing::{debug, info, instrument, trace};

use crate::error::{ReplayError, Result};
use crate::object::ObjectId;
use crate::store::{SnapshotFilter, SnapshotStore};
use crate::value::PropertyValue;

/// Placeholder object identifier written by older capture tools.
const PLACEHOLDER_OBJECT: &str = "-";

/// Builds [`DeviceModel`]s from a snapshot store.
pub struct DeviceModelBuilder<'a> {
    store: &'a SnapshotStore,
}

impl<'a> DeviceModelBuilder<'a> {
    pub const fn new(store: &'a SnapshotStore) -> Self {
        Self { store }
    }

    /// Rebuild the model of one device.
    ///
    /// Fails with a configuration error naming the device (and object, where
    /// one is at fault) if a mandatory property is missing or a stored value
    /// does not fit its property.
    #[instrument(skip(self))]
    pub fn build(&self, device_id: u32) -> Result<DeviceModel> {
        let devid = device_id.to_string();
        let device_object = ObjectId::device(device_id).to_string();

        self.require(&devid, &device_object, "objectName", "object name")?;
        self.require(&devid, &device_object, "vendorIdentifier", "vendor identifier")?;

        let device = self.build_device(device_id, &devid, &device_object)?;

        let mut objects = Vec::new();
        for (objid, values) in self.group_objects(&devid, &device_object)? {
            let id: ObjectId = objid
                .parse()
                .map_err(|e| ReplayError::configuration(format!("device {device_id}: object {objid}: {e}")))?;

            let mut object = ObjectInstance::construct(id, values).map_err(|e| {
                ReplayError::configuration(format!("device {device_id}: object {objid}: {e}"))
            })?;

            if object.set_mutable("presentValue") {
                trace!(%id, "presentValue made writable");
            }
            objects.push(object);
        }

        let model = DeviceModel::new(device, objects).map_err(|id| {
            ReplayError::configuration(format!("device {device_id}: object {id} defined more than once"))
        })?;

        info!(
            device_id,
            name = model.device().object_name(),
            objects = model.objects().len(),
            "Device model built"
        );
        Ok(model)
    }

    fn require(&self, devid: &str, objid: &str, propid: &str, label: &str) -> Result<PropertyValue> {
        self.store
            .get(devid, objid, propid)?
            .ok_or_else(|| ReplayError::configuration(format!("device {devid}: {label} not found")))
    }

    fn build_device(&self, device_id: u32, devid: &str, device_object: &str) -> Result<DeviceDescriptor> {
        let mut values = Vec::new();
        for record in self.store.iterate(&SnapshotFilter::device(devid).object(device_object))? {
            let record = record?;
            if DERIVED_DEVICE_PROPERTIES.contains(&record.key.propid.as_str()) {
                trace!(property = %record.key.propid, "Skipping derived device property");
                continue;
            }
            values.push((record.key.propid, record.value));
        }

        let object = ObjectInstance::construct(ObjectId::device(device_id), values)
            .map_err(|e| ReplayError::configuration(format!("device {device_id}: {e}")))?;

        debug!(properties = object.len(), "Device object assembled");
        Ok(DeviceDescriptor { device_id, object })
    }

    /// Group the device's non-device rows by object identifier, in order of
    /// first appearance. A repeated property name keeps its last value.
    fn group_objects(
        &self,
        devid: &str,
        device_object: &str,
    ) -> Result<Vec<(String, Vec<(String, PropertyValue)>)>> {
        let mut groups: Vec<(String, HashMap<String, PropertyValue>)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for record in self.store.iterate(&SnapshotFilter::device(devid))? {
            let record = record?;
            let objid = record.key.objid;
            if objid == PLACEHOLDER_OBJECT || objid == device_object {
                continue;
            }

            let position = *positions.entry(objid.clone()).or_insert_with(|| {
                groups.push((objid, HashMap::new()));
                groups.len() - 1
            });
            groups[position].1.insert(record.key.propid, record.value);
        }

        debug!(objects = groups.len(), "Object rows grouped");
        Ok(groups
            .into_iter()
            .map(|(objid, values)| (objid, values.into_iter().collect()))
            .collect())
    }
}
