//! Request, response and error values exchanged with replay nodes.
//!
//! These are the decoded forms of the application services the replay network
//! answers. Wire encoding belongs to the BACnet/IP stack behind the transport.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::Address;
use crate::object::ObjectId;
use crate::value::PropertyValue;

/// An outstanding service request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    ReadProperty {
        destination: Address,
        object: ObjectId,
        property: String,
        index: Option<u32>,
    },
    WriteProperty {
        destination: Address,
        object: ObjectId,
        property: String,
        value: PropertyValue,
        index: Option<u32>,
        priority: Option<u8>,
    },
    WhoIs {
        destination: Address,
        /// Inclusive device instance range.
        range: Option<(u32, u32)>,
    },
    /// Announce the router's own device.
    IAm { destination: Address },
}

impl Request {
    pub const fn destination(&self) -> &Address {
        match self {
            Self::ReadProperty { destination, .. }
            | Self::WriteProperty { destination, .. }
            | Self::WhoIs { destination, .. }
            | Self::IAm { destination } => destination,
        }
    }

    /// Confirmed services expect an acknowledgement from exactly one device.
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::ReadProperty { .. } | Self::WriteProperty { .. })
    }

    /// Service name used in logs.
    pub const fn service(&self) -> &'static str {
        match self {
            Self::ReadProperty { .. } => "readProperty",
            Self::WriteProperty { .. } => "writeProperty",
            Self::WhoIs { .. } => "whoIs",
            Self::IAm { .. } => "iAm",
        }
    }
}

/// Successful completion of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    ReadAck(ReadAck),
    /// Simple acknowledgement of a write.
    Ack,
    /// Unconfirmed request handed off; nothing further to wait for.
    Sent,
}

/// Result of a ReadProperty request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadAck {
    pub object: ObjectId,
    pub property: String,
    pub index: Option<u32>,
    pub value: PropertyValue,
}

/// A device announcing itself in answer to Who-Is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IAm {
    pub source: Address,
    pub device: ObjectId,
    pub max_apdu_length: u64,
    pub segmentation: u32,
    pub vendor_id: u64,
}

impl fmt::Display for IAm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {} (vendor {}, max apdu {})",
            self.device, self.source, self.vendor_id, self.max_apdu_length
        )
    }
}

/// Error class reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    Device,
    Object,
    Property,
    Resources,
    Services,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Device => "device",
            Self::Object => "object",
            Self::Property => "property",
            Self::Resources => "resources",
            Self::Services => "services",
        })
    }
}

/// Error code reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    UnknownObject,
    UnknownProperty,
    WriteAccessDenied,
    InvalidDataType,
    InvalidArrayIndex,
    PropertyIsNotAnArray,
    ValueOutOfRange,
    ParameterOutOfRange,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnknownObject => "unknownObject",
            Self::UnknownProperty => "unknownProperty",
            Self::WriteAccessDenied => "writeAccessDenied",
            Self::InvalidDataType => "invalidDataType",
            Self::InvalidArrayIndex => "invalidArrayIndex",
            Self::PropertyIsNotAnArray => "propertyIsNotAnArray",
            Self::ValueOutOfRange => "valueOutOfRange",
            Self::ParameterOutOfRange => "parameterOutOfRange",
        })
    }
}

/// Request-level failure. Resolves the request's own handle only.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestError {
    #[error("error: {class}, {code}")]
    Error { class: ErrorClass, code: ErrorCode },

    #[error("reject: {0}")]
    Reject(String),

    #[error("abort: {0}")]
    Abort(String),

    #[error("timeout")]
    Timeout,

    #[error("no route to network {0}")]
    NoRoute(u16),

    #[error("{address} unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("malformed request: {0}")]
    Malformed(String),
}

impl RequestError {
    pub const fn error(class: ErrorClass, code: ErrorCode) -> Self {
        Self::Error { class, code }
    }

    pub const fn property(code: ErrorCode) -> Self {
        Self::error(ErrorClass::Property, code)
    }

    pub fn unreachable(address: &Address, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}
