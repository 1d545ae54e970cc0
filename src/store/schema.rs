//! Snapshot row types.
//!
//! A snapshot row is keyed by `(devid, objid, propid)`. All three parts are
//! opaque strings at this layer; the model builder gives them meaning.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::PropertyValue;

/// Composite key of one stored value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub devid: String,
    pub objid: String,
    pub propid: String,
}

impl SnapshotKey {
    pub fn new(devid: impl Into<String>, objid: impl Into<String>, propid: impl Into<String>) -> Self {
        Self {
            devid: devid.into(),
            objid: objid.into(),
            propid: propid.into(),
        }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.devid, self.objid, self.propid)
    }
}

/// One stored value and its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(flatten)]
    pub key: SnapshotKey,
    pub value: PropertyValue,
}

/// Exact-match filter over the three key parts.
///
/// Omitted parts match everything; supplied parts are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotFilter {
    pub devid: Option<String>,
    pub objid: Option<String>,
    pub propid: Option<String>,
}

impl SnapshotFilter {
    /// A filter that matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn device(devid: impl Into<String>) -> Self {
        Self {
            devid: Some(devid.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn object(mut self, objid: impl Into<String>) -> Self {
        self.objid = Some(objid.into());
        self
    }

    #[must_use]
    pub fn property(mut self, propid: impl Into<String>) -> Self {
        self.propid = Some(propid.into());
        self
    }

    /// Build a filter from command-line arguments where `-` means "any".
    pub fn from_args(devid: &str, objid: &str, propid: &str) -> Self {
        let arg = |s: &str| (s != "-").then(|| s.to_string());
        Self {
            devid: arg(devid),
            objid: arg(objid),
            propid: arg(propid),
        }
    }

    /// Check a key against the filter.
    pub fn matches(&self, key: &SnapshotKey) -> bool {
        self.devid.as_deref().is_none_or(|d| d == key.devid)
            && self.objid.as_deref().is_none_or(|o| o == key.objid)
            && self.propid.as_deref().is_none_or(|p| p == key.propid)
    }

    /// SQL `WHERE` clause and its positional parameters.
    pub(crate) fn where_clause(&self) -> (String, Vec<&str>) {
        let mut terms = Vec::new();
        let mut args = Vec::new();
        for (column, value) in [
            ("devid", &self.devid),
            ("objid", &self.objid),
            ("propid", &self.propid),
        ] {
            if let Some(value) = value {
                args.push(value.as_str());
                terms.push(format!("({column} = ?{})", args.len()));
            }
        }

        if terms.is_empty() {
            (String::new(), args)
        } else {
            (format!(" WHERE {}", terms.join(" AND ")), args)
        }
    }
}
