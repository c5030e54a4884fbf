//! JSON-backed configuration.
//!
//! The config file is optional: a missing or unparsable file is replaced
//! with the defaults, which are written back so the player has something
//! to edit. Unknown keys are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Application configuration loaded from `abrogue.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Initial window width in pixels.
    pub window_width: u32,
    /// Initial window height in pixels.
    pub window_height: u32,
    /// Optional log file path; `None` logs to the console only.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 720,
            log_file: Some(PathBuf::from("abrogue.log")),
        }
    }
}

impl Config {
    /// Loads the configuration from `path`.
    ///
    /// On a missing or malformed file the defaults are saved back to `path`
    /// and returned. A zero window dimension is treated as malformed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => {
                info!("no config at {}, writing defaults", path.display());
                let config = Self::default();
                config.save(path)?;
                return Ok(config);
            }
        };

        match serde_json::from_str::<Self>(&contents) {
            Ok(config) if config.window_width > 0 && config.window_height > 0 => Ok(config),
            Ok(_) => {
                warn!("config at {} has a zero window size, using defaults", path.display());
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
            Err(e) => {
                warn!("couldn't parse {}: {e}, using defaults", path.display());
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
        }
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("couldn't serialize config: {e}")))?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.window_width > 0);
        assert!(config.window_height > 0);
    }

    #[test]
    fn round_trips_through_json() {
        let config = Config {
            window_width: 1920,
            window_height: 1080,
            log_file: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn ignores_unknown_keys() {
        let parsed: Config =
            serde_json::from_str(r#"{"window_width": 800, "vsync": true}"#).unwrap();
        assert_eq!(parsed.window_width, 800);
        assert_eq!(parsed.window_height, Config::default().window_height);
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = std::env::temp_dir().join("abrogue-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("missing.json");
        let _ = std::fs::remove_file(&path);

        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        std::fs::remove_file(&path).unwrap();
    }
}
