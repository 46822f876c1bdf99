//! Session configuration.
//!
//! Loaded from YAML; every field falls back to the defaults below, which select
//! a single ECG lead (first bipolar channel) at 500 Hz streamed over the network.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app::PlotSettings;
use crate::channels::ChannelSelection;
use crate::device::{BaseSampleRate, DeviceType, Interfaces, VALID_DIVIDERS};
use crate::error::ConfigError;
use crate::stream::{OutputFormat, StreamConfig};

/// Channel-group divider applied to every channel type (4000 Hz / 8 = 500 Hz).
pub const DEFAULT_DIVIDER: u32 = 8;

/// Label of the outbound stream.
pub const DEFAULT_STREAM_LABEL: &str = "SAGA";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub device_type: DeviceType,
    pub interfaces: Interfaces,
    pub base_sample_rate: BaseSampleRate,
    pub divider: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Saga,
            interfaces: Interfaces::default(),
            base_sample_rate: BaseSampleRate::Decimal,
            divider: DEFAULT_DIVIDER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub format: OutputFormat,
    pub label: String,
    #[serde(flatten)]
    pub target: StreamConfig,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Network,
            label: DEFAULT_STREAM_LABEL.to_string(),
            target: StreamConfig::default(),
        }
    }
}

/// Everything a session needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub device: DeviceSettings,
    pub channels: ChannelSelection,
    pub stream: StreamSettings,
    pub plot: PlotSettings,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_DIVIDERS.contains(&self.device.divider) {
            return Err(ConfigError::Invalid(format!(
                "divider {} must be one of {:?}",
                self.device.divider, VALID_DIVIDERS
            )));
        }
        if self.stream.label.is_empty() {
            return Err(ConfigError::Invalid("stream label is empty".to_string()));
        }
        if !(self.plot.time_window_secs > 0.0) {
            return Err(ConfigError::Invalid("plot time window must be positive".to_string()));
        }
        if self.plot.max_points == 0 {
            return Err(ConfigError::Invalid("plot max_points must be positive".to_string()));
        }
        Ok(())
    }

    pub fn from_yaml(s: &str, path: &Path) -> Result<SessionConfig, ConfigError> {
        let config: SessionConfig = serde_yaml::from_str(s).map_err(|source| ConfigError::Yaml {
            path: path.to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<SessionConfig, ConfigError> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml(&s, path)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let s = serde_yaml::to_string(self).map_err(|source| ConfigError::Yaml {
            path: path.to_owned(),
            source,
        })?;
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_owned(),
                source,
            })?;
        }
        fs::write(path, s).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })
    }

    /// `~/.ecg-stream/config.yaml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::NoHome)?;
        Ok(PathBuf::from(home).join(".ecg-stream").join("config.yaml"))
    }

    /// Load from the default path, or `None` if there is no file there.
    pub fn load_from_default_path() -> Result<Option<SessionConfig>, ConfigError> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.device.divider, 8);
        assert_eq!(config.device.base_sample_rate, BaseSampleRate::Decimal);
        assert_eq!(config.stream.label, "SAGA");
        assert!(config.channels.aux.is_empty());
        assert!(config.channels.bip.contains(&0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = "channels:\n  bip: [0, 1]\nstream:\n  format: csv\n  output_dir: /tmp/rec\n";
        let config = SessionConfig::from_yaml(yaml, Path::new("test.yaml")).unwrap();
        assert_eq!(config.channels.bip.len(), 2);
        assert!(config.channels.aux.is_empty());
        assert_eq!(config.stream.format, OutputFormat::Csv);
        assert_eq!(config.stream.target.output_dir, PathBuf::from("/tmp/rec"));
        assert_eq!(config.stream.target.bind, StreamConfig::default().bind);
        assert_eq!(config.device, DeviceSettings::default());
    }

    #[test]
    fn test_rejects_bad_divider() {
        let yaml = "device:\n  divider: 5\n";
        let error = SessionConfig::from_yaml(yaml, Path::new("test.yaml")).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(_)));
    }
}
