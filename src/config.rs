//! Configuration file handling for device preferences

use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    /// Per-device overrides, keyed by serial number
    pub devices: HashMap<String, DeviceConfig>,
}

impl Config {
    /// Get the config file path for this platform
    pub fn path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "streamdeck-hid")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Load config from file, or use defaults if it doesn't exist
    pub fn load() -> Result<Self, Box<dyn Error>> {
        let path = Self::path().ok_or("could not determine config directory")?;

        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            Ok(Self::from_toml(&contents)?)
        } else {
            info!("no config at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Brightness for a device, preferring its own override
    pub fn brightness_for(&self, serial: &str) -> Option<u8> {
        self.devices
            .get(serial)
            .and_then(|device| device.brightness)
            .or(self.general.brightness)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Brightness applied to every device, in percent
    pub brightness: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub brightness: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.brightness_for("ABC"), None);
    }

    #[test]
    fn device_overrides_general() {
        let config = Config::from_toml(
            r#"
            [general]
            brightness = 40

            [devices.AL12]
            brightness = 90

            [devices.AL13]
            "#,
        )
        .unwrap();
        assert_eq!(config.brightness_for("AL12"), Some(90));
        assert_eq!(config.brightness_for("AL13"), Some(40));
        assert_eq!(config.brightness_for("other"), Some(40));
    }

    #[test]
    fn survives_serialization() {
        let mut config = Config::default();
        config.general.brightness = Some(10);
        config.devices.insert(
            "AL12".into(),
            DeviceConfig {
                brightness: Some(70),
            },
        );
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn rejects_bad_types() {
        assert!(Config::from_toml("[general]\nbrightness = \"bright\"").is_err());
    }
}
