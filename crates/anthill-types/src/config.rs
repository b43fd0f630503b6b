use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{AnthillError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

/// Time zone used when deriving archive identifiers from snapshot timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveTimeZone {
    #[default]
    Utc,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub log_dir: String,
    pub extension: String,
    #[serde(default)]
    pub timezone: ArchiveTimeZone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub long_frame_threshold_ms: f64,
    pub max_history: usize,
    pub fps_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub settings_dir: String,
    pub settings_key: String,
    pub evaluation_interval_ms: u64,
    /// Frame gap after which the watchdog treats the simulation as frozen.
    #[serde(default = "default_freeze_threshold_ms")]
    pub freeze_threshold_ms: u64,
}

fn default_freeze_threshold_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthillConfig {
    pub server: ServerConfig,
    pub archive: ArchiveConfig,
    pub telemetry: TelemetryConfig,
    pub session: SessionConfig,
    pub ops: OpsConfig,
}

impl Default for AnthillConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "127.0.0.1".into(),
                port: 8000,
            },
            archive: ArchiveConfig {
                log_dir: "logs".into(),
                extension: "json".into(),
                timezone: ArchiveTimeZone::Utc,
            },
            telemetry: TelemetryConfig {
                long_frame_threshold_ms: 100.0,
                max_history: 100,
                fps_window: 10,
            },
            session: SessionConfig {
                settings_dir: "state".into(),
                settings_key: "antSimulationSettings".into(),
                evaluation_interval_ms: 1000,
                freeze_threshold_ms: default_freeze_threshold_ms(),
            },
            ops: OpsConfig {
                log_level: "info".into(),
            },
        }
    }
}

impl AnthillConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            AnthillError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            AnthillError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AnthillError::Configuration(
                "server.port must be a valid port (>0)".into(),
            ));
        }
        if self.archive.log_dir.trim().is_empty() {
            return Err(AnthillError::Configuration(
                "archive.log_dir must not be empty".into(),
            ));
        }
        if self.archive.extension.is_empty()
            || !self.archive.extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(AnthillError::Configuration(
                "archive.extension must be a non-empty alphanumeric suffix".into(),
            ));
        }
        if !(self.telemetry.long_frame_threshold_ms > 0.0) {
            return Err(AnthillError::Configuration(
                "telemetry.long_frame_threshold_ms must be greater than zero".into(),
            ));
        }
        if self.telemetry.max_history == 0 {
            return Err(AnthillError::Configuration(
                "telemetry.max_history must be greater than zero".into(),
            ));
        }
        if self.telemetry.fps_window == 0 {
            return Err(AnthillError::Configuration(
                "telemetry.fps_window must be greater than zero".into(),
            ));
        }
        if self.session.settings_key.is_empty() {
            return Err(AnthillError::Configuration(
                "session.settings_key must not be empty".into(),
            ));
        }
        if self.session.evaluation_interval_ms == 0 {
            return Err(AnthillError::Configuration(
                "session.evaluation_interval_ms must be greater than zero".into(),
            ));
        }
        if self.session.freeze_threshold_ms == 0 {
            return Err(AnthillError::Configuration(
                "session.freeze_threshold_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_anthill_config_from_file() {
        let temp_path = std::env::temp_dir().join("anthill-config-test.toml");
        let mut config = AnthillConfig::default();
        config.server.port = 9100;
        config.archive.timezone = ArchiveTimeZone::Local;
        config.telemetry.max_history = 64;

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = AnthillConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.server.port, 9100);
        assert_eq!(loaded.archive.timezone, ArchiveTimeZone::Local);
        assert_eq!(loaded.telemetry.max_history, 64);
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn freeze_threshold_defaults_when_absent() {
        let mut doc: toml::Value =
            toml::Value::try_from(AnthillConfig::default()).expect("serialize config");
        doc["session"]
            .as_table_mut()
            .expect("session table")
            .remove("freeze_threshold_ms");
        let loaded: AnthillConfig = doc.try_into().expect("deserialize config");
        assert_eq!(loaded.session.freeze_threshold_ms, 5_000);
    }

    #[test]
    fn missing_config_file_is_a_configuration_error() {
        let err = AnthillConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, AnthillError::Configuration(_)));
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = AnthillConfig::default();
        assert!(config.validate().is_ok());

        config.server.port = 0;
        assert!(config.validate().is_err());
        config.server.port = 8000;
        config.archive.extension = "../json".into();
        assert!(config.validate().is_err());
        config.archive.extension = "json".into();
        config.telemetry.long_frame_threshold_ms = 0.0;
        assert!(config.validate().is_err());
        config.telemetry.long_frame_threshold_ms = 100.0;
        config.telemetry.max_history = 0;
        assert!(config.validate().is_err());
        config.telemetry.max_history = 100;
        config.session.evaluation_interval_ms = 0;
        assert!(config.validate().is_err());
        config.session.evaluation_interval_ms = 1000;
        config.session.freeze_threshold_ms = 0;
        assert!(config.validate().is_err());
        config.session.freeze_threshold_ms = 5000;
        assert!(config.validate().is_ok());
    }
}
