//! Device descriptor and the per-node device model.

use std::collections::HashMap;

use chrono::Local;

use super::object::{ObjectInstance, read_index};
use crate::network::Address;
use crate::object::ObjectId;
use crate::service::{ErrorClass, ErrorCode, IAm, RequestError};
use crate::value::PropertyValue;

/// Device properties computed by the node rather than replayed.
pub const DERIVED_DEVICE_PROPERTIES: [&str; 5] = [
    "localDate",
    "localTime",
    "protocolServicesSupported",
    "propertyList",
    "objectList",
];

/// Answered when the snapshot has no `maxApduLengthAccepted`.
const DEFAULT_MAX_APDU: u64 = 1024;
/// Answered when the snapshot has no `segmentationSupported` (noSegmentation).
const DEFAULT_SEGMENTATION: u32 = 3;

/// Services executed by a replay node, as protocolServicesSupported bits.
const SERVICES_SUPPORTED: [usize; 4] = [
    12, // readProperty
    15, // writeProperty
    26, // i-Am
    34, // who-Is
];
const SERVICES_BITS: usize = 40;

/// The device object of one replayed device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub device_id: u32,
    pub object: ObjectInstance,
}

impl DeviceDescriptor {
    pub const fn object_id(&self) -> ObjectId {
        ObjectId::device(self.device_id)
    }

    pub fn object_name(&self) -> &str {
        self.object
            .get("objectName")
            .and_then(PropertyValue::as_str)
            .unwrap_or_default()
    }

    pub fn vendor_identifier(&self) -> u64 {
        self.object
            .get("vendorIdentifier")
            .and_then(PropertyValue::as_unsigned)
            .unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.object.get(name)
    }
}

/// Everything one replay node serves: its device object and other objects.
///
/// Each node owns its model; nothing here is shared between nodes.
#[derive(Debug, Clone)]
pub struct DeviceModel {
    device: DeviceDescriptor,
    objects: Vec<ObjectInstance>,
    index: HashMap<ObjectId, usize>,
}

impl DeviceModel {
    /// Assemble a model. Fails with the first object identifier that repeats.
    pub fn new(device: DeviceDescriptor, objects: Vec<ObjectInstance>) -> Result<Self, ObjectId> {
        let mut index = HashMap::with_capacity(objects.len());
        for (i, object) in objects.iter().enumerate() {
            if object.id() == device.object_id() || index.insert(object.id(), i).is_some() {
                return Err(object.id());
            }
        }
        Ok(Self {
            device,
            objects,
            index,
        })
    }

    pub const fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub const fn device_id(&self) -> u32 {
        self.device.device_id
    }

    /// Non-device objects in construction order.
    pub fn objects(&self) -> &[ObjectInstance] {
        &self.objects
    }

    /// Look up any object, including the device object.
    pub fn object(&self, id: &ObjectId) -> Option<&ObjectInstance> {
        if *id == self.device.object_id() {
            return Some(&self.device.object);
        }
        self.index.get(id).map(|&i| &self.objects[i])
    }

    fn object_mut(&mut self, id: &ObjectId) -> Option<&mut ObjectInstance> {
        if *id == self.device.object_id() {
            return Some(&mut self.device.object);
        }
        self.index.get(id).map(|&i| &mut self.objects[i])
    }

    /// The `objectList` value: the device object followed by every other
    /// object.
    pub fn object_list(&self) -> PropertyValue {
        PropertyValue::List(
            std::iter::once(self.device.object_id())
                .chain(self.objects.iter().map(ObjectInstance::id))
                .map(PropertyValue::ObjectIdentifier)
                .collect(),
        )
    }

    /// Answer a ReadProperty.
    pub fn read_property(
        &self,
        object: &ObjectId,
        property: &str,
        index: Option<u32>,
    ) -> Result<PropertyValue, RequestError> {
        if *object == self.device.object_id() {
            if let Some(value) = self.derived(property) {
                return read_index(value, index);
            }
        }

        self.object(object)
            .ok_or(RequestError::error(ErrorClass::Object, ErrorCode::UnknownObject))?
            .read(property, index)
    }

    /// Apply a WriteProperty.
    ///
    /// Objects here are not commandable, so a valid priority is accepted and
    /// otherwise ignored.
    pub fn write_property(
        &mut self,
        object: &ObjectId,
        property: &str,
        value: PropertyValue,
        index: Option<u32>,
        priority: Option<u8>,
    ) -> Result<(), RequestError> {
        if priority.is_some_and(|p| !(1..=16).contains(&p)) {
            return Err(RequestError::error(
                ErrorClass::Services,
                ErrorCode::ParameterOutOfRange,
            ));
        }
        if *object == self.device.object_id() && DERIVED_DEVICE_PROPERTIES.contains(&property) {
            return Err(RequestError::property(ErrorCode::WriteAccessDenied));
        }

        self.object_mut(object)
            .ok_or(RequestError::error(ErrorClass::Object, ErrorCode::UnknownObject))?
            .write(property, value, index)
    }

    /// Whether this device answers a Who-Is with the given range.
    pub fn matches_who_is(&self, range: Option<(u32, u32)>) -> bool {
        range.is_none_or(|(low, high)| (low..=high).contains(&self.device.device_id))
    }

    /// The I-Am this device sends from `source`.
    pub fn i_am(&self, source: Address) -> IAm {
        let max_apdu_length = self
            .device
            .get("maxApduLengthAccepted")
            .and_then(PropertyValue::as_unsigned)
            .unwrap_or(DEFAULT_MAX_APDU);
        let segmentation = self
            .device
            .get("segmentationSupported")
            .and_then(PropertyValue::as_unsigned)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(DEFAULT_SEGMENTATION);

        IAm {
            source,
            device: self.device.object_id(),
            max_apdu_length,
            segmentation,
            vendor_id: self.device.vendor_identifier(),
        }
    }

    fn derived(&self, property: &str) -> Option<PropertyValue> {
        match property {
            "localDate" => Some(PropertyValue::Date(Local::now().date_naive())),
            "localTime" => Some(PropertyValue::Time(Local::now().time())),
            "protocolServicesSupported" => {
                let mut bits = vec![false; SERVICES_BITS];
                for bit in SERVICES_SUPPORTED {
                    bits[bit] = true;
                }
                Some(PropertyValue::BitString(bits))
            }
            "objectList" => Some(self.object_list()),
            "propertyList" => {
                let mut names: Vec<&str> = self
                    .device
                    .object
                    .property_names()
                    .filter(|n| *n != "objectName")
                    .collect();
                for name in DERIVED_DEVICE_PROPERTIES {
                    if name != "propertyList" {
                        names.push(name);
                    }
                }
                names.sort_unstable();
                names.dedup();
                Some(PropertyValue::List(names.into_iter().map(PropertyValue::text).collect()))
            }
            _ => None,
        }
    }
}
