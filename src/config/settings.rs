//! Settings that tune a replay run without changing what is replayed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ReplayError, Result};

/// Default console wait for a single request.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default foreign device registration lifetime.
pub const DEFAULT_TTL_SECS: u16 = 30;

/// Everything a settings file may carry.
///
/// # Example YAML
///
/// ```yaml
/// console:
///   timeout_secs: 5
///   prompt: "bac> "
/// loop:
///   sleep_ms: 10
/// bip:
///   ttl: 60
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplaySettings {
    pub console: ConsoleSettings,

    #[serde(rename = "loop")]
    pub event_loop: LoopSettings,

    pub bip: BipSettings,
}

/// Operator console behavior.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleSettings {
    /// Seconds to wait for a request before reporting a timeout.
    pub timeout_secs: u64,

    /// Printed before each command. Empty for none.
    pub prompt: String,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            prompt: "> ".to_string(),
        }
    }
}

impl ConsoleSettings {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopSettings {
    /// Pause between loop iterations, in milliseconds. Absent or zero means
    /// the loop only yields.
    pub sleep_ms: Option<u64>,
}

impl LoopSettings {
    pub fn sleep(&self) -> Option<Duration> {
        self.sleep_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

/// BACnet/IP defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BipSettings {
    /// Foreign device registration lifetime in seconds.
    pub ttl: u16,
}

impl Default for BipSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL_SECS,
        }
    }
}

impl ReplaySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        trace!(?self, "Validating settings");

        if self.console.timeout_secs == 0 {
            return Err(ReplayError::ConfigParse(
                "console.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.bip.ttl == 0 {
            return Err(ReplayError::ConfigParse("bip.ttl must be at least 1".to_string()));
        }

        debug!("Settings validated");
        Ok(())
    }
}
