//! Settings file discovery and parsing.
//!
//! A settings file is YAML or TOML, chosen by extension. It is looked up in
//! this order:
//! 1. `--config <file>` on the command line
//! 2. `BACREPLAY_CONFIG` (handled by clap as the flag's env fallback)
//! 3. `<config dir>/bacreplay/config.toml`, then `config.yaml`
//!
//! Only the default location may be absent; a file named explicitly must
//! exist.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, trace};

use super::settings::ReplaySettings;
use crate::error::{ReplayError, Result};

/// Settings file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format (.yaml, .yml).
    Yaml,
    /// TOML format (.toml).
    Toml,
}

impl ConfigFormat {
    /// Detect format from file extension.
    #[must_use]
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        trace!(extension = %ext, "Detecting settings format from extension");
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Directory holding the default settings files.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bacreplay"))
}

/// The first default settings file that exists.
pub fn default_config_path() -> Option<PathBuf> {
    let dir = config_dir()?;
    ["config.toml", "config.yaml", "config.yml"]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Resolve settings for a run.
///
/// `explicit` comes from `--config` or `BACREPLAY_CONFIG`. Without it the
/// default location is tried and defaults are used if nothing is there.
pub fn resolve_settings(explicit: Option<&Path>) -> Result<ReplaySettings> {
    if let Some(path) = explicit {
        return load_settings(path);
    }
    match default_config_path() {
        Some(path) => load_settings(&path),
        None => {
            debug!("No settings file, using defaults");
            Ok(ReplaySettings::default())
        }
    }
}

/// Load settings from a file.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<ReplaySettings> {
    let path = path.as_ref();
    info!("Loading settings file");

    let format = ConfigFormat::from_extension(path).ok_or_else(|| {
        ReplayError::ConfigParse(format!(
            "Unknown settings format for '{}': expected .yaml, .yml, or .toml",
            path.display()
        ))
    })?;

    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ReplayError::ConfigNotFound {
                path: path.display().to_string(),
            }
        } else {
            ReplayError::Io(e)
        }
    })?;
    debug!(bytes = content.len(), "Read settings file");

    load_settings_from_str(&content, format)
}

/// Parse and validate settings text.
pub fn load_settings_from_str(content: &str, format: ConfigFormat) -> Result<ReplaySettings> {
    let settings: ReplaySettings = match format {
        ConfigFormat::Yaml if content.trim().is_empty() => ReplaySettings::default(),
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| ReplayError::ConfigParse(format!("YAML: {e}")))?
        }
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ReplayError::ConfigParse(format!("TOML: {e}")))?
        }
    };

    settings.validate()?;
    debug!(?settings, "Settings loaded");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_extension(Path::new("a.yaml")), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_extension(Path::new("a.YML")), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_extension(Path::new("a.toml")), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension(Path::new("a.json")), None);
        assert_eq!(ConfigFormat::from_extension(Path::new("config")), None);
    }

    #[test]
    fn test_load_yaml() {
        let yaml = r#"
console:
  timeout_secs: 3
  prompt: ""
loop:
  sleep_ms: 5
"#;
        let settings = load_settings_from_str(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(settings.console.timeout_secs, 3);
        assert_eq!(settings.console.prompt, "");
        assert_eq!(settings.event_loop.sleep_ms, Some(5));
        assert_eq!(settings.bip.ttl, 30);
    }

    #[test]
    fn test_load_toml() {
        let toml_str = r#"
[bip]
ttl = 120

[loop]
sleep_ms = 1
"#;
        let settings = load_settings_from_str(toml_str, ConfigFormat::Toml).unwrap();
        assert_eq!(settings.bip.ttl, 120);
        assert_eq!(settings.event_loop.sleep_ms, Some(1));
        assert_eq!(settings.console.timeout_secs, 10);
    }

    #[test]
    fn test_empty_files_give_defaults() {
        assert_eq!(
            load_settings_from_str("", ConfigFormat::Yaml).unwrap(),
            ReplaySettings::default()
        );
        assert_eq!(
            load_settings_from_str("", ConfigFormat::Toml).unwrap(),
            ReplaySettings::default()
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = load_settings_from_str("[console]\ncolour = true\n", ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, ReplayError::ConfigParse(_)));
    }

    #[test]
    fn test_explicit_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = resolve_settings(Some(&path)).unwrap_err();
        assert!(matches!(err, ReplayError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "console:\n  timeout_secs: 2").unwrap();
        let settings = load_settings(file.path()).unwrap();
        assert_eq!(settings.console.timeout_secs, 2);
    }

    #[test]
    fn test_unknown_extension() {
        let err = load_settings("settings.ini").unwrap_err();
        assert!(err.to_string().contains("expected .yaml"));
    }
}
