//! Object identifiers and per-object-type property tables.
//!
//! Every supported object type has one [`PropertyTable`], built once, mapping
//! property names to a [`PropertySpec`]. The spec is the typed setter used when
//! snapshot rows are assigned onto an object: it coerces the stored value into
//! the property's datatype or rejects it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::value::{PropertyValue, ValueKind};

/// Largest valid object instance number (22 bits).
pub const MAX_INSTANCE: u32 = 0x3F_FFFF;

macro_rules! object_types {
    ($($variant:ident => $name:literal, $camel:literal, $number:literal;)*) => {
        /// Supported BACnet object types.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum ObjectType {
            $($variant,)*
        }

        impl ObjectType {
            /// All supported types, in enumeration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)*];

            /// Canonical hyphenated name (e.g. "analog-input").
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            /// BACnet enumeration value.
            pub const fn number(self) -> u16 {
                match self {
                    $(Self::$variant => $number,)*
                }
            }

            /// camelCase name used by capture tools (e.g. "analogInput").
            pub const fn camel_name(self) -> &'static str {
                match self {
                    $(Self::$variant => $camel,)*
                }
            }

            fn lookup(name: &str) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|t| t.as_str() == name || t.camel_name() == name)
            }
        }
    };
}

object_types! {
    AnalogInput => "analog-input", "analogInput", 0;
    AnalogOutput => "analog-output", "analogOutput", 1;
    AnalogValue => "analog-value", "analogValue", 2;
    BinaryInput => "binary-input", "binaryInput", 3;
    BinaryOutput => "binary-output", "binaryOutput", 4;
    BinaryValue => "binary-value", "binaryValue", 5;
    Calendar => "calendar", "calendar", 6;
    Device => "device", "device", 8;
    File => "file", "file", 10;
    Loop => "loop", "loop", 12;
    MultiStateInput => "multi-state-input", "multiStateInput", 13;
    MultiStateOutput => "multi-state-output", "multiStateOutput", 14;
    NotificationClass => "notification-class", "notificationClass", 15;
    Program => "program", "program", 16;
    Schedule => "schedule", "schedule", 17;
    MultiStateValue => "multi-state-value", "multiStateValue", 19;
    TrendLog => "trend-log", "trendLog", 20;
    Accumulator => "accumulator", "accumulator", 23;
    StructuredView => "structured-view", "structuredView", 29;
    CharacterStringValue => "characterstring-value", "characterstringValue", 40;
    IntegerValue => "integer-value", "integerValue", 45;
    LargeAnalogValue => "large-analog-value", "largeAnalogValue", 46;
    PositiveIntegerValue => "positive-integer-value", "positiveIntegerValue", 48;
    DateValue => "date-value", "dateValue", 42;
    TimeValue => "time-value", "timeValue", 50;
    OctetStringValue => "octetstring-value", "octetstringValue", 47;
    BitStringValue => "bitstring-value", "bitstringValue", 39;
}

impl ObjectType {
    /// The property table for this object type.
    pub fn properties(self) -> &'static PropertyTable {
        &PROPERTY_TABLES[&self]
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s).ok_or_else(|| format!("unknown object type '{s}'"))
    }
}

/// A type-and-instance pair identifying one object within a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectId {
    pub const fn new(object_type: ObjectType, instance: u32) -> Self {
        Self {
            object_type,
            instance,
        }
    }

    /// The device object identifier for a device instance.
    pub const fn device(instance: u32) -> Self {
        Self::new(ObjectType::Device, instance)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.instance)
    }
}

impl FromStr for ObjectId {
    type Err = String;

    /// Parses `type:instance`, accepting hyphenated or camelCase type names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_part, instance_part) = s
            .split_once(':')
            .ok_or_else(|| format!("object identifier '{s}' is not type:instance"))?;
        let object_type = type_part.parse::<ObjectType>()?;
        let instance = instance_part
            .parse::<u32>()
            .map_err(|_| format!("invalid instance number in '{s}'"))?;
        if instance > MAX_INSTANCE {
            return Err(format!("instance number out of range in '{s}'"));
        }
        Ok(Self::new(object_type, instance))
    }
}

/// Declaration of one property of an object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: &'static str,
    pub kind: ValueKind,
    /// Construction fails without this property.
    pub required: bool,
    /// Writable through WriteProperty by default.
    pub writable: bool,
}

impl PropertySpec {
    const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            writable: false,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    /// Typed setter: coerce `value` into this property's datatype.
    pub fn assign(&self, value: PropertyValue) -> Result<PropertyValue, ValueKind> {
        let found = value.kind();
        self.kind.coerce(value).ok_or(found)
    }
}

/// Name -> spec mapping for one object type.
#[derive(Debug)]
pub struct PropertyTable {
    specs: HashMap<&'static str, PropertySpec>,
}

impl PropertyTable {
    fn build(groups: &[&[PropertySpec]]) -> Self {
        let mut specs = HashMap::new();
        for group in groups {
            for spec in *group {
                specs.insert(spec.name, *spec);
            }
        }
        Self { specs }
    }

    pub fn get(&self, name: &str) -> Option<&PropertySpec> {
        self.specs.get(name)
    }

    /// Names of required properties.
    pub fn required(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.values().filter(|s| s.required).map(|s| s.name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

use ValueKind as K;

const COMMON: &[PropertySpec] = &[
    PropertySpec::new("objectIdentifier", K::ObjectIdentifier),
    PropertySpec::new("objectName", K::CharacterString),
    PropertySpec::new("objectType", K::Enumerated),
    PropertySpec::new("description", K::CharacterString).writable(),
    PropertySpec::new("propertyList", K::List),
    PropertySpec::new("profileName", K::CharacterString),
];

const STATUS: &[PropertySpec] = &[
    PropertySpec::new("statusFlags", K::BitString),
    PropertySpec::new("eventState", K::Enumerated),
    PropertySpec::new("reliability", K::Enumerated),
    PropertySpec::new("outOfService", K::Boolean).writable(),
];

const INTRINSIC_REPORTING: &[PropertySpec] = &[
    PropertySpec::new("notificationClass", K::Unsigned),
    PropertySpec::new("timeDelay", K::Unsigned),
    PropertySpec::new("timeDelayNormal", K::Unsigned),
    PropertySpec::new("eventEnable", K::BitString),
    PropertySpec::new("ackedTransitions", K::BitString),
    PropertySpec::new("notifyType", K::Enumerated),
    PropertySpec::new("eventTimeStamps", K::List),
    PropertySpec::new("eventMessageTexts", K::List),
    PropertySpec::new("eventDetectionEnable", K::Boolean),
];

const COMMANDABLE: &[PropertySpec] = &[
    PropertySpec::new("priorityArray", K::List),
    PropertySpec::new("currentCommandPriority", K::Any),
];

const ANALOG: &[PropertySpec] = &[
    PropertySpec::new("units", K::Enumerated),
    PropertySpec::new("deviceType", K::CharacterString),
    PropertySpec::new("covIncrement", K::Real).writable(),
    PropertySpec::new("minPresValue", K::Real),
    PropertySpec::new("maxPresValue", K::Real),
    PropertySpec::new("resolution", K::Real),
    PropertySpec::new("highLimit", K::Real),
    PropertySpec::new("lowLimit", K::Real),
    PropertySpec::new("deadband", K::Real),
    PropertySpec::new("limitEnable", K::BitString),
    PropertySpec::new("updateInterval", K::Unsigned),
];

const BINARY: &[PropertySpec] = &[
    PropertySpec::new("polarity", K::Enumerated),
    PropertySpec::new("inactiveText", K::CharacterString),
    PropertySpec::new("activeText", K::CharacterString),
    PropertySpec::new("deviceType", K::CharacterString),
    PropertySpec::new("changeOfStateTime", K::Any),
    PropertySpec::new("changeOfStateCount", K::Unsigned),
    PropertySpec::new("timeOfStateCountReset", K::Any),
    PropertySpec::new("elapsedActiveTime", K::Unsigned),
    PropertySpec::new("timeOfActiveTimeReset", K::Any),
    PropertySpec::new("minimumOffTime", K::Unsigned),
    PropertySpec::new("minimumOnTime", K::Unsigned),
    PropertySpec::new("alarmValue", K::Enumerated),
    PropertySpec::new("feedbackValue", K::Enumerated),
];

const MULTI_STATE: &[PropertySpec] = &[
    PropertySpec::new("numberOfStates", K::Unsigned),
    PropertySpec::new("stateText", K::List),
    PropertySpec::new("deviceType", K::CharacterString),
    PropertySpec::new("alarmValues", K::List),
    PropertySpec::new("faultValues", K::List),
    PropertySpec::new("feedbackValue", K::Unsigned),
];

const AI: &[PropertySpec] = &[PropertySpec::new("presentValue", K::Real).required()];
const AO: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::Real).required().writable(),
    PropertySpec::new("relinquishDefault", K::Real).writable(),
];
const BI: &[PropertySpec] = &[PropertySpec::new("presentValue", K::Enumerated).required()];
const BO: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::Enumerated).required().writable(),
    PropertySpec::new("relinquishDefault", K::Enumerated).writable(),
];
const MSI: &[PropertySpec] = &[PropertySpec::new("presentValue", K::Unsigned).required()];
const MSO: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::Unsigned).required().writable(),
    PropertySpec::new("relinquishDefault", K::Unsigned).writable(),
];

const DEVICE: &[PropertySpec] = &[
    PropertySpec::new("objectName", K::CharacterString).required(),
    PropertySpec::new("vendorIdentifier", K::Unsigned).required(),
    PropertySpec::new("systemStatus", K::Enumerated),
    PropertySpec::new("vendorName", K::CharacterString),
    PropertySpec::new("modelName", K::CharacterString),
    PropertySpec::new("firmwareRevision", K::CharacterString),
    PropertySpec::new("applicationSoftwareVersion", K::CharacterString),
    PropertySpec::new("location", K::CharacterString).writable(),
    PropertySpec::new("protocolVersion", K::Unsigned),
    PropertySpec::new("protocolRevision", K::Unsigned),
    PropertySpec::new("protocolServicesSupported", K::BitString),
    PropertySpec::new("protocolObjectTypesSupported", K::BitString),
    PropertySpec::new("objectList", K::List),
    PropertySpec::new("structuredObjectList", K::List),
    PropertySpec::new("maxApduLengthAccepted", K::Unsigned),
    PropertySpec::new("segmentationSupported", K::Enumerated),
    PropertySpec::new("maxSegmentsAccepted", K::Unsigned),
    PropertySpec::new("apduSegmentTimeout", K::Unsigned),
    PropertySpec::new("apduTimeout", K::Unsigned),
    PropertySpec::new("numberOfApduRetries", K::Unsigned),
    PropertySpec::new("deviceAddressBinding", K::List),
    PropertySpec::new("databaseRevision", K::Unsigned),
    PropertySpec::new("localDate", K::Date),
    PropertySpec::new("localTime", K::Time),
    PropertySpec::new("utcOffset", K::Integer),
    PropertySpec::new("daylightSavingsStatus", K::Boolean),
    PropertySpec::new("activeCovSubscriptions", K::List),
    PropertySpec::new("timeSynchronizationRecipients", K::List),
    PropertySpec::new("restartNotificationRecipients", K::List),
    PropertySpec::new("lastRestartReason", K::Enumerated),
    PropertySpec::new("timeOfDeviceRestart", K::Any),
    PropertySpec::new("serialNumber", K::CharacterString),
];

const CALENDAR: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::Boolean).required(),
    PropertySpec::new("dateList", K::List),
];

const FILE: &[PropertySpec] = &[
    PropertySpec::new("fileType", K::CharacterString),
    PropertySpec::new("fileSize", K::Unsigned),
    PropertySpec::new("modificationDate", K::Any),
    PropertySpec::new("archive", K::Boolean).writable(),
    PropertySpec::new("readOnly", K::Boolean),
    PropertySpec::new("fileAccessMethod", K::Enumerated),
    PropertySpec::new("recordCount", K::Unsigned),
];

const LOOP: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::Real).required(),
    PropertySpec::new("updateInterval", K::Unsigned),
    PropertySpec::new("outputUnits", K::Enumerated),
    PropertySpec::new("manipulatedVariableReference", K::Any),
    PropertySpec::new("controlledVariableReference", K::Any),
    PropertySpec::new("controlledVariableValue", K::Real),
    PropertySpec::new("controlledVariableUnits", K::Enumerated),
    PropertySpec::new("setpointReference", K::Any),
    PropertySpec::new("setpoint", K::Real).writable(),
    PropertySpec::new("action", K::Enumerated),
    PropertySpec::new("proportionalConstant", K::Real),
    PropertySpec::new("proportionalConstantUnits", K::Enumerated),
    PropertySpec::new("integralConstant", K::Real),
    PropertySpec::new("integralConstantUnits", K::Enumerated),
    PropertySpec::new("derivativeConstant", K::Real),
    PropertySpec::new("derivativeConstantUnits", K::Enumerated),
    PropertySpec::new("bias", K::Real),
    PropertySpec::new("maximumOutput", K::Real),
    PropertySpec::new("minimumOutput", K::Real),
    PropertySpec::new("priorityForWriting", K::Unsigned),
];

const NOTIFICATION_CLASS: &[PropertySpec] = &[
    PropertySpec::new("notificationClass", K::Unsigned),
    PropertySpec::new("priority", K::List),
    PropertySpec::new("ackRequired", K::BitString),
    PropertySpec::new("recipientList", K::List),
];

const PROGRAM: &[PropertySpec] = &[
    PropertySpec::new("programState", K::Enumerated),
    PropertySpec::new("programChange", K::Enumerated).writable(),
    PropertySpec::new("reasonForHalt", K::Enumerated),
    PropertySpec::new("descriptionOfHalt", K::CharacterString),
    PropertySpec::new("programLocation", K::CharacterString),
    PropertySpec::new("instanceOf", K::CharacterString),
];

const SCHEDULE: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::Any).required(),
    PropertySpec::new("effectivePeriod", K::Any),
    PropertySpec::new("weeklySchedule", K::List),
    PropertySpec::new("exceptionSchedule", K::List),
    PropertySpec::new("scheduleDefault", K::Any),
    PropertySpec::new("listOfObjectPropertyReferences", K::List),
    PropertySpec::new("priorityForWriting", K::Unsigned),
];

const TREND_LOG: &[PropertySpec] = &[
    PropertySpec::new("enable", K::Boolean).writable(),
    PropertySpec::new("startTime", K::Any),
    PropertySpec::new("stopTime", K::Any),
    PropertySpec::new("logDeviceObjectProperty", K::Any),
    PropertySpec::new("logInterval", K::Unsigned),
    PropertySpec::new("stopWhenFull", K::Boolean),
    PropertySpec::new("bufferSize", K::Unsigned),
    PropertySpec::new("logBuffer", K::List),
    PropertySpec::new("recordCount", K::Unsigned),
    PropertySpec::new("totalRecordCount", K::Unsigned),
    PropertySpec::new("loggingType", K::Enumerated),
];

const ACCUMULATOR: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::Unsigned).required(),
    PropertySpec::new("scale", K::Any),
    PropertySpec::new("units", K::Enumerated),
    PropertySpec::new("prescale", K::Any),
    PropertySpec::new("maxPresValue", K::Unsigned),
    PropertySpec::new("valueChangeTime", K::Any),
    PropertySpec::new("valueBeforeChange", K::Unsigned),
    PropertySpec::new("valueSet", K::Unsigned),
    PropertySpec::new("pulseRate", K::Unsigned),
];

const STRUCTURED_VIEW: &[PropertySpec] = &[
    PropertySpec::new("nodeType", K::Enumerated),
    PropertySpec::new("nodeSubtype", K::CharacterString),
    PropertySpec::new("subordinateList", K::List),
    PropertySpec::new("subordinateAnnotations", K::List),
];

const CSV: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::CharacterString).required().writable(),
];
const IV: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::Integer).required().writable(),
    PropertySpec::new("units", K::Enumerated),
];
const LAV: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::Double).required().writable(),
    PropertySpec::new("units", K::Enumerated),
];
const PIV: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::Unsigned).required().writable(),
    PropertySpec::new("units", K::Enumerated),
];
const DV: &[PropertySpec] = &[PropertySpec::new("presentValue", K::Date).required().writable()];
const TV: &[PropertySpec] = &[PropertySpec::new("presentValue", K::Time).required().writable()];
const OSV: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::OctetString).required().writable(),
];
const BSV: &[PropertySpec] = &[
    PropertySpec::new("presentValue", K::BitString).required().writable(),
    PropertySpec::new("bitText", K::List),
];

static PROPERTY_TABLES: LazyLock<HashMap<ObjectType, PropertyTable>> = LazyLock::new(|| {
    use ObjectType as T;

    ObjectType::ALL
        .iter()
        .map(|&object_type| {
            let groups: &[&[PropertySpec]] = match object_type {
                T::AnalogInput => &[COMMON, STATUS, INTRINSIC_REPORTING, ANALOG, AI],
                T::AnalogOutput | T::AnalogValue => {
                    &[COMMON, STATUS, INTRINSIC_REPORTING, ANALOG, COMMANDABLE, AO]
                }
                T::BinaryInput => &[COMMON, STATUS, INTRINSIC_REPORTING, BINARY, BI],
                T::BinaryOutput | T::BinaryValue => {
                    &[COMMON, STATUS, INTRINSIC_REPORTING, BINARY, COMMANDABLE, BO]
                }
                T::MultiStateInput => &[COMMON, STATUS, INTRINSIC_REPORTING, MULTI_STATE, MSI],
                T::MultiStateOutput | T::MultiStateValue => {
                    &[COMMON, STATUS, INTRINSIC_REPORTING, MULTI_STATE, COMMANDABLE, MSO]
                }
                T::Calendar => &[COMMON, CALENDAR],
                T::Device => &[COMMON, DEVICE],
                T::File => &[COMMON, FILE],
                T::Loop => &[COMMON, STATUS, INTRINSIC_REPORTING, LOOP],
                T::NotificationClass => &[COMMON, NOTIFICATION_CLASS],
                T::Program => &[COMMON, STATUS, PROGRAM],
                T::Schedule => &[COMMON, STATUS, SCHEDULE],
                T::TrendLog => &[COMMON, STATUS, INTRINSIC_REPORTING, TREND_LOG],
                T::Accumulator => &[COMMON, STATUS, INTRINSIC_REPORTING, ACCUMULATOR],
                T::StructuredView => &[COMMON, STRUCTURED_VIEW],
                T::CharacterStringValue => &[COMMON, STATUS, COMMANDABLE, CSV],
                T::IntegerValue => &[COMMON, STATUS, COMMANDABLE, IV],
                T::LargeAnalogValue => &[COMMON, STATUS, COMMANDABLE, LAV],
                T::PositiveIntegerValue => &[COMMON, STATUS, COMMANDABLE, PIV],
                T::DateValue => &[COMMON, STATUS, COMMANDABLE, DV],
                T::TimeValue => &[COMMON, STATUS, COMMANDABLE, TV],
                T::OctetStringValue => &[COMMON, STATUS, COMMANDABLE, OSV],
                T::BitStringValue => &[COMMON, STATUS, COMMANDABLE, BSV],
            };
            (object_type, PropertyTable::build(groups))
        })
        .collect()
});
