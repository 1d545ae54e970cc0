//! Property values as captured from field devices.
//!
//! Snapshot rows hold values of many different shapes: scalars, sequences such
//! as `objectList` or `priorityArray`, and constructed values (date-time
//! stamps, device object property references) that carry their own multi-line
//! inspection form. They are modeled as one closed enum so that storage,
//! printing and typed assignment can all match exhaustively.

use std::fmt;
use std::io::{self, Write};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::object::ObjectId;

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Unsigned(u64),
    Integer(i64),
    Real(f32),
    Double(f64),
    OctetString(Vec<u8>),
    CharacterString(String),
    BitString(Vec<bool>),
    Enumerated(u32),
    Date(NaiveDate),
    Time(NaiveTime),
    ObjectIdentifier(ObjectId),
    /// Sequence or array of values.
    List(Vec<PropertyValue>),
    /// Constructed value with named fields.
    Structured(Structured),
}

/// A constructed value with named fields, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structured {
    /// Name of the constructed type (e.g. "DateTime").
    pub type_name: String,
    pub fields: Vec<(String, PropertyValue)>,
}

impl Structured {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    pub fn with_field(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&PropertyValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Datatype tag used by property tables to type-check assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Boolean,
    Unsigned,
    Integer,
    Real,
    Double,
    OctetString,
    CharacterString,
    BitString,
    Enumerated,
    Date,
    Time,
    ObjectIdentifier,
    List,
    Structured,
    /// Any value is accepted as-is.
    Any,
}

impl ValueKind {
    /// Human-readable datatype name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Boolean => "Boolean",
            Self::Unsigned => "Unsigned",
            Self::Integer => "Integer",
            Self::Real => "Real",
            Self::Double => "Double",
            Self::OctetString => "OctetString",
            Self::CharacterString => "CharacterString",
            Self::BitString => "BitString",
            Self::Enumerated => "Enumerated",
            Self::Date => "Date",
            Self::Time => "Time",
            Self::ObjectIdentifier => "ObjectIdentifier",
            Self::List => "List",
            Self::Structured => "Structured",
            Self::Any => "Any",
        }
    }

    /// Convert `value` into this datatype, or `None` if it cannot be
    /// represented without losing information.
    ///
    /// Numeric widenings (unsigned to real, real to double, unsigned to
    /// enumerated) are accepted because capture tools do not always preserve
    /// the exact primitive tag.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn coerce(self, value: PropertyValue) -> Option<PropertyValue> {
        use PropertyValue as V;

        match (self, value) {
            (Self::Any, v) => Some(v),
            (Self::Null, V::Null) => Some(V::Null),
            (Self::Boolean, V::Boolean(b)) => Some(V::Boolean(b)),
            (Self::Boolean, V::Enumerated(n)) if n <= 1 => Some(V::Boolean(n == 1)),
            (Self::Unsigned, V::Unsigned(n)) => Some(V::Unsigned(n)),
            (Self::Unsigned, V::Integer(n)) => u64::try_from(n).ok().map(V::Unsigned),
            (Self::Integer, V::Integer(n)) => Some(V::Integer(n)),
            (Self::Integer, V::Unsigned(n)) => i64::try_from(n).ok().map(V::Integer),
            (Self::Real, V::Real(r)) => Some(V::Real(r)),
            (Self::Real, V::Double(d)) => Some(V::Real(d as f32)),
            (Self::Real, V::Unsigned(n)) => Some(V::Real(n as f32)),
            (Self::Real, V::Integer(n)) => Some(V::Real(n as f32)),
            (Self::Double, V::Double(d)) => Some(V::Double(d)),
            (Self::Double, V::Real(r)) => Some(V::Double(f64::from(r))),
            (Self::Double, V::Unsigned(n)) => Some(V::Double(n as f64)),
            (Self::Double, V::Integer(n)) => Some(V::Double(n as f64)),
            (Self::OctetString, V::OctetString(o)) => Some(V::OctetString(o)),
            (Self::CharacterString, V::CharacterString(s)) => Some(V::CharacterString(s)),
            (Self::BitString, V::BitString(b)) => Some(V::BitString(b)),
            (Self::Enumerated, V::Enumerated(n)) => Some(V::Enumerated(n)),
            (Self::Enumerated, V::Unsigned(n)) => u32::try_from(n).ok().map(V::Enumerated),
            (Self::Enumerated, V::Boolean(b)) => Some(V::Enumerated(u32::from(b))),
            (Self::Date, V::Date(d)) => Some(V::Date(d)),
            (Self::Time, V::Time(t)) => Some(V::Time(t)),
            (Self::ObjectIdentifier, V::ObjectIdentifier(id)) => Some(V::ObjectIdentifier(id)),
            (Self::List, V::List(items)) => Some(V::List(items)),
            (Self::Structured, V::Structured(s)) => Some(V::Structured(s)),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl PropertyValue {
    /// The datatype of this value.
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Unsigned(_) => ValueKind::Unsigned,
            Self::Integer(_) => ValueKind::Integer,
            Self::Real(_) => ValueKind::Real,
            Self::Double(_) => ValueKind::Double,
            Self::OctetString(_) => ValueKind::OctetString,
            Self::CharacterString(_) => ValueKind::CharacterString,
            Self::BitString(_) => ValueKind::BitString,
            Self::Enumerated(_) => ValueKind::Enumerated,
            Self::Date(_) => ValueKind::Date,
            Self::Time(_) => ValueKind::Time,
            Self::ObjectIdentifier(_) => ValueKind::ObjectIdentifier,
            Self::List(_) => ValueKind::List,
            Self::Structured(_) => ValueKind::Structured,
        }
    }

    /// Shorthand for a character string value.
    pub fn text(s: impl Into<String>) -> Self {
        Self::CharacterString(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::CharacterString(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of unsigned, enumerated and non-negative integer values.
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Self::Unsigned(n) => Some(*n),
            Self::Enumerated(n) => Some(u64::from(*n)),
            Self::Integer(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// True for values that carry a multi-line inspection form.
    pub const fn has_debug_contents(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    /// Write the multi-line inspection form of this value.
    ///
    /// Each nesting level indents by four spaces, starting at `indent`.
    /// Scalars print as a single `value` line.
    pub fn debug_contents(&self, out: &mut dyn Write, indent: usize) -> io::Result<()> {
        let pad = "    ".repeat(indent);
        match self {
            Self::Structured(s) => {
                for (name, value) in &s.fields {
                    match value {
                        Self::Structured(_) | Self::List(_) => {
                            writeln!(out, "{pad}{name}")?;
                            value.debug_contents(out, indent + 1)?;
                        }
                        _ => writeln!(out, "{pad}{name} = {value}")?,
                    }
                }
                Ok(())
            }
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if item.has_debug_contents() {
                        writeln!(out, "{pad}[{i}]")?;
                        item.debug_contents(out, indent + 1)?;
                    } else {
                        writeln!(out, "{pad}[{i}] {item}")?;
                    }
                }
                Ok(())
            }
            other => writeln!(out, "{pad}{other}"),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Unsigned(n) => write!(f, "{n}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::OctetString(o) => f.write_str(&hex::encode(o)),
            Self::CharacterString(s) => f.write_str(s),
            Self::BitString(bits) => {
                for bit in bits {
                    f.write_str(if *bit { "1" } else { "0" })?;
                }
                Ok(())
            }
            Self::Enumerated(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            Self::ObjectIdentifier(id) => write!(f, "{id}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Structured(s) => write!(f, "<{}>", s.type_name),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f32> for PropertyValue {
    fn from(r: f32) -> Self {
        Self::Real(r)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::CharacterString(s.to_string())
    }
}

impl From<ObjectId> for PropertyValue {
    fn from(id: ObjectId) -> Self {
        Self::ObjectIdentifier(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectType;

    fn date_time() -> PropertyValue {
        PropertyValue::Structured(
            Structured::new("DateTime")
                .with_field(
                    "date",
                    PropertyValue::Date(NaiveDate::from_ymd_opt(2020, 3, 1).unwrap()),
                )
                .with_field(
                    "time",
                    PropertyValue::Time(NaiveTime::from_hms_opt(12, 30, 0).unwrap()),
                ),
        )
    }

    #[test]
    fn test_display_scalars() {
        assert_eq!(PropertyValue::Real(72.5).to_string(), "72.5");
        assert_eq!(PropertyValue::OctetString(vec![0x0a, 0xff]).to_string(), "0aff");
        assert_eq!(
            PropertyValue::BitString(vec![true, false, true]).to_string(),
            "101"
        );
        assert_eq!(
            PropertyValue::ObjectIdentifier(ObjectId::new(ObjectType::AnalogInput, 3)).to_string(),
            "analog-input:3"
        );
    }

    #[test]
    fn test_display_list() {
        let list = PropertyValue::List(vec![PropertyValue::Unsigned(1), PropertyValue::Null]);
        assert_eq!(list.to_string(), "[1, null]");
    }

    #[test]
    fn test_debug_contents_structured() {
        let mut out = Vec::new();
        date_time().debug_contents(&mut out, 1).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "    date = 2020-03-01\n    time = 12:30:00\n");
    }

    #[test]
    fn test_debug_contents_nested() {
        let value = PropertyValue::Structured(
            Structured::new("EventTimeStamps").with_field("stamps", PropertyValue::List(vec![date_time()])),
        );
        let mut out = Vec::new();
        value.debug_contents(&mut out, 0).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("stamps\n    [0]\n        date = 2020-03-01"));
    }

    #[test]
    fn test_coerce_widening() {
        assert_eq!(
            ValueKind::Real.coerce(PropertyValue::Unsigned(4)),
            Some(PropertyValue::Real(4.0))
        );
        assert_eq!(
            ValueKind::Enumerated.coerce(PropertyValue::Unsigned(1)),
            Some(PropertyValue::Enumerated(1))
        );
        assert_eq!(ValueKind::Unsigned.coerce(PropertyValue::Integer(-1)), None);
        assert_eq!(ValueKind::CharacterString.coerce(PropertyValue::Real(1.0)), None);
    }

    #[test]
    fn test_coerce_any_keeps_value() {
        let v = date_time();
        assert_eq!(ValueKind::Any.coerce(v.clone()), Some(v));
    }
}
