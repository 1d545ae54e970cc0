//! Live object instances built from snapshot rows.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::trace;

use crate::object::{ObjectId, ObjectType};
use crate::service::{ErrorCode, RequestError};
use crate::value::{PropertyValue, ValueKind};

/// Properties answered from the identifier rather than stored. A stored row
/// must agree with the identifier.
const IDENTITY_PROPERTIES: [&str; 2] = ["objectIdentifier", "objectType"];

/// Largest length an array can be resized to through index 0.
pub const MAX_ARRAY_LEN: usize = 4096;

/// Why a group of rows could not become an object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructError {
    #[error("missing required property {0}")]
    MissingRequired(&'static str),

    #[error("property {property}: expected {expected}, found {found}")]
    WrongType {
        property: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("stored {property} {found} does not match the object identifier")]
    IdentityMismatch { property: String, found: String },
}

/// One property slot on an object.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub value: PropertyValue,
    pub kind: ValueKind,
    pub mutable: bool,
}

/// An object with its property values.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInstance {
    id: ObjectId,
    properties: BTreeMap<String, Property>,
}

impl ObjectInstance {
    /// Build an object from stored `(name, value)` pairs.
    ///
    /// Each value passes through the type's property table. Names the table
    /// does not declare are kept read-only with their stored value.
    pub fn construct<I>(id: ObjectId, values: I) -> Result<Self, ConstructError>
    where
        I: IntoIterator<Item = (String, PropertyValue)>,
    {
        let table = id.object_type.properties();
        let mut properties = BTreeMap::new();

        for (name, value) in values {
            if IDENTITY_PROPERTIES.contains(&name.as_str()) {
                if !matches_identity(id, &name, &value) {
                    return Err(ConstructError::IdentityMismatch {
                        found: value.to_string(),
                        property: name,
                    });
                }
                trace!(%id, property = %name, "Identity property matches");
                continue;
            }

            let property = match table.get(&name) {
                Some(spec) => Property {
                    value: spec.assign(value).map_err(|found| ConstructError::WrongType {
                        property: name.clone(),
                        expected: spec.kind,
                        found,
                    })?,
                    kind: spec.kind,
                    mutable: spec.writable,
                },
                None => Property {
                    value,
                    kind: ValueKind::Any,
                    mutable: false,
                },
            };
            properties.insert(name, property);
        }

        let mut required: Vec<&'static str> = table.required().collect();
        required.sort_unstable();
        if let Some(missing) = required.into_iter().find(|r| !properties.contains_key(*r)) {
            return Err(ConstructError::MissingRequired(missing));
        }

        Ok(Self { id, properties })
    }

    pub const fn id(&self) -> ObjectId {
        self.id
    }

    pub const fn object_type(&self) -> ObjectType {
        self.id.object_type
    }

    /// Stored value of a property.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name).map(|p| &p.value)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Names of stored properties, sorted.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Mark a property writable. Returns false if the object has no such
    /// property.
    pub fn set_mutable(&mut self, name: &str) -> bool {
        match self.properties.get_mut(name) {
            Some(property) => {
                property.mutable = true;
                true
            }
            None => false,
        }
    }

    pub fn is_mutable(&self, name: &str) -> bool {
        self.properties.get(name).is_some_and(|p| p.mutable)
    }

    /// The `propertyList` value. A captured list is served as stored;
    /// otherwise every property except `objectName` and the identity ones.
    pub fn property_list(&self) -> PropertyValue {
        if let Some(stored) = self.get("propertyList") {
            return stored.clone();
        }
        PropertyValue::List(
            self.property_names()
                .filter(|name| !matches!(*name, "objectName" | "propertyList"))
                .map(PropertyValue::text)
                .collect(),
        )
    }

    /// Answer a ReadProperty for this object.
    pub fn read(&self, name: &str, index: Option<u32>) -> Result<PropertyValue, RequestError> {
        let value = match name {
            "objectIdentifier" => PropertyValue::ObjectIdentifier(self.id),
            "objectType" => PropertyValue::Enumerated(u32::from(self.id.object_type.number())),
            "propertyList" => self.property_list(),
            _ => self
                .get(name)
                .cloned()
                .ok_or(RequestError::property(ErrorCode::UnknownProperty))?,
        };
        read_index(value, index)
    }

    /// Apply a WriteProperty to this object.
    pub fn write(
        &mut self,
        name: &str,
        value: PropertyValue,
        index: Option<u32>,
    ) -> Result<(), RequestError> {
        let property = self
            .properties
            .get_mut(name)
            .ok_or(RequestError::property(ErrorCode::UnknownProperty))?;
        if !property.mutable {
            return Err(RequestError::property(ErrorCode::WriteAccessDenied));
        }

        match index {
            None => {
                property.value = property
                    .kind
                    .coerce(value)
                    .ok_or(RequestError::property(ErrorCode::InvalidDataType))?;
            }
            Some(index) => {
                let PropertyValue::List(items) = &mut property.value else {
                    return Err(RequestError::property(ErrorCode::PropertyIsNotAnArray));
                };
                write_index(items, index, value)?;
            }
        }

        trace!(id = %self.id, property = name, "Property written");
        Ok(())
    }
}

/// True if a stored identity row agrees with `id`.
fn matches_identity(id: ObjectId, name: &str, value: &PropertyValue) -> bool {
    let object_type = id.object_type;
    match (name, value) {
        ("objectIdentifier", PropertyValue::ObjectIdentifier(stored)) => *stored == id,
        ("objectIdentifier", PropertyValue::CharacterString(text)) => {
            text.parse::<ObjectId>().is_ok_and(|stored| stored == id)
        }
        ("objectType", PropertyValue::Enumerated(n)) => *n == u32::from(object_type.number()),
        ("objectType", PropertyValue::Unsigned(n)) => *n == u64::from(object_type.number()),
        ("objectType", PropertyValue::CharacterString(text)) => {
            text == object_type.as_str() || text == object_type.camel_name()
        }
        _ => false,
    }
}

/// Select an array element. Index 0 is the array length.
pub(crate) fn read_index(value: PropertyValue, index: Option<u32>) -> Result<PropertyValue, RequestError> {
    let Some(index) = index else {
        return Ok(value);
    };
    let PropertyValue::List(items) = value else {
        return Err(RequestError::property(ErrorCode::PropertyIsNotAnArray));
    };

    if index == 0 {
        return Ok(PropertyValue::Unsigned(items.len() as u64));
    }
    items
        .into_iter()
        .nth(index as usize - 1)
        .ok_or(RequestError::property(ErrorCode::InvalidArrayIndex))
}

/// Replace one element, or resize the array when `index` is 0.
fn write_index(items: &mut Vec<PropertyValue>, index: u32, value: PropertyValue) -> Result<(), RequestError> {
    if index == 0 {
        let len = value
            .as_unsigned()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(RequestError::property(ErrorCode::InvalidDataType))?;
        if len > MAX_ARRAY_LEN {
            return Err(RequestError::property(ErrorCode::ParameterOutOfRange));
        }
        items.resize(len, PropertyValue::Null);
        return Ok(());
    }

    let slot = items
        .get_mut(index as usize - 1)
        .ok_or(RequestError::property(ErrorCode::InvalidArrayIndex))?;
    let replacement = match (&*slot, value) {
        (PropertyValue::Null, value) | (_, value @ PropertyValue::Null) => value,
        (current, value) => current
            .kind()
            .coerce(value)
            .ok_or(RequestError::property(ErrorCode::InvalidDataType))?,
    };
    *slot = replacement;
    Ok(())
}
