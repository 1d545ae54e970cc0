//! Run settings: console timeout and prompt, loop pacing and BACnet/IP
//! defaults, loaded from an optional YAML or TOML file.

mod loader;
mod settings;

pub use loader::{
    ConfigFormat, config_dir, default_config_path, load_settings, load_settings_from_str,
    resolve_settings,
};
pub use settings::{
    BipSettings, ConsoleSettings, DEFAULT_TIMEOUT_SECS, DEFAULT_TTL_SECS, LoopSettings,
    ReplaySettings,
};
