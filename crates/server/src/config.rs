//! Startup configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Settings read once at boot and never changed afterwards.
///
/// Every field carries a default so a missing field never prevents boot.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StartupConfig {
    /// Severity name (`VERBOSE`, `DEBUG`, `INFORMATION`, `WARNING`, `ERROR`, `FATAL`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Port the agent server listens on.
    #[serde(default = "default_port")]
    pub server_port: u16,
    /// Grace period in seconds before the player gate is first checked.
    #[serde(default)]
    pub waiting_time: f64,
    /// Number of joined players required before the simulation starts.
    #[serde(default = "default_expected_player_num")]
    pub expected_player_num: usize,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind_address: String,
    /// Tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl StartupConfig {
    /// The grace period as a `Duration`.
    ///
    /// Negative or NaN values are no grace period; values too large for a
    /// `Duration` saturate.
    pub fn waiting_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.waiting_time).unwrap_or(if self.waiting_time > 0.0 {
            Duration::MAX
        } else {
            Duration::ZERO
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Check the value ranges serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_port == 0 {
            return Err(ConfigError::Invalid("server_port must be between 1 and 65535"));
        }
        if Duration::try_from_secs_f64(self.waiting_time).is_err() {
            return Err(ConfigError::Invalid(
                "waiting_time must be a non-negative number of seconds",
            ));
        }
        if self.expected_player_num == 0 {
            return Err(ConfigError::Invalid("expected_player_num must be positive"));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive"));
        }
        Ok(())
    }

    /// Serialize in the given format (used to write a default config file).
    pub fn to_string_pretty(&self, format: ConfigFormat) -> anyhow::Result<String> {
        Ok(match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        })
    }
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server_port: default_port(),
            waiting_time: 0.0,
            expected_player_num: default_expected_player_num(),
            bind_address: default_bind(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

fn default_log_level() -> String {
    "INFORMATION".to_string()
}
fn default_port() -> u16 {
    8888
}
fn default_expected_player_num() -> usize {
    1
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_tick_interval() -> u64 {
    50
}

/// Why a configuration blob was rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration is empty")]
    Empty,

    #[error("Configuration must be a JSON object")]
    NotAnObject,

    #[error("Configuration is not valid UTF-8")]
    Encoding,

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration value: {0}")]
    Invalid(&'static str),
}

/// Serialization format of the configuration source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    #[default]
    Json,
    Toml,
}

impl ConfigFormat {
    /// `.toml` files are TOML, everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

/// Turns a raw configuration blob into a [`StartupConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigLoader {
    format: ConfigFormat,
}

impl ConfigLoader {
    pub fn new(format: ConfigFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }

    /// Parse and validate, reporting why the blob was rejected.
    pub fn try_load(&self, raw: &[u8]) -> Result<StartupConfig, ConfigError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(ConfigError::Empty);
        }

        let config: StartupConfig = match self.format {
            ConfigFormat::Json => {
                // Derived `Deserialize` would also accept a positional array.
                let value: serde_json::Value = serde_json::from_slice(raw)?;
                if !value.is_object() {
                    return Err(ConfigError::NotAnObject);
                }
                serde_json::from_value(value)?
            }
            ConfigFormat::Toml => {
                let text = std::str::from_utf8(raw).map_err(|_| ConfigError::Encoding)?;
                toml::from_str(text)?
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate, substituting the defaults for anything unusable.
    ///
    /// Never fails: a malformed blob is indistinguishable from "use defaults".
    pub fn load(&self, raw: &[u8]) -> StartupConfig {
        self.try_load(raw).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json() -> ConfigLoader {
        ConfigLoader::new(ConfigFormat::Json)
    }

    #[test]
    fn test_full_json() {
        let raw = br#"{"log_level":"DEBUG","server_port":9000,"waiting_time":1.5,"expected_player_num":4}"#;
        let config = json().load(raw);
        assert_eq!(config.log_level, "DEBUG");
        assert_eq!(config.server_port, 9000);
        assert_eq!(config.waiting_time(), Duration::from_millis(1500));
        assert_eq!(config.expected_player_num, 4);
        assert_eq!(config.tick_interval_ms, 50);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = json().load(br#"{"log_level": "INFORMATION"}"#);
        assert_eq!(config, StartupConfig::default());

        let config = json().load(br#"{"expected_player_num": 2}"#);
        assert_eq!(config.expected_player_num, 2);
        assert_eq!(config.server_port, 8888);
    }

    #[test]
    fn test_malformed_input_falls_back_to_defaults() {
        let inputs: &[&[u8]] = &[
            b"",
            b"   \n",
            b"null",
            b"[]",
            b"[1, 2, 3]",
            br#"["DEBUG", 9000, 0, 3]"#,
            b"42",
            br#""config""#,
            b"{not json",
            b"\xff\xfe\x00",
            br#"{"server_port": "eighty"}"#,
            br#"{"server_port": 70000}"#,
            br#"{"server_port": 0}"#,
            br#"{"waiting_time": -3}"#,
            br#"{"waiting_time": 1e20}"#,
            br#"{"expected_player_num": 0}"#,
            br#"{"expected_player_num": -1}"#,
            br#"{"tick_interval_ms": 0}"#,
        ];
        for raw in inputs {
            assert_eq!(
                json().load(raw),
                StartupConfig::default(),
                "input {:?}",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn test_try_load_reports_reason() {
        assert!(matches!(json().try_load(b""), Err(ConfigError::Empty)));
        assert!(matches!(json().try_load(b"{"), Err(ConfigError::Json(_))));
        assert!(matches!(json().try_load(b"[]"), Err(ConfigError::NotAnObject)));
        assert!(matches!(
            json().try_load(br#"["DEBUG", 9000, 0, 3]"#),
            Err(ConfigError::NotAnObject)
        ));
        assert!(matches!(
            json().try_load(br#"{"server_port": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_waiting_time_must_fit_a_duration() {
        let config = StartupConfig {
            waiting_time: 1e20,
            ..StartupConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.waiting_time(), Duration::MAX);

        let config = StartupConfig {
            waiting_time: 86_400.0,
            ..StartupConfig::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.waiting_time(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_toml_source() {
        let loader = ConfigLoader::new(ConfigFormat::from_path(Path::new("server.toml")));
        assert_eq!(loader.format(), ConfigFormat::Toml);

        let config = loader.load(b"log_level = \"WARNING\"\nserver_port = 7777\n");
        assert_eq!(config.log_level, "WARNING");
        assert_eq!(config.server_port, 7777);

        assert_eq!(loader.load(b"server_port = [\n"), StartupConfig::default());
        assert!(matches!(loader.try_load(b"\xff = 1"), Err(ConfigError::Encoding)));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("config.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("config")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a/B.TOML")), ConfigFormat::Toml);
    }

    #[test]
    fn test_default_config_round_trips_through_file_formats() {
        let config = StartupConfig::default();
        for format in [ConfigFormat::Json, ConfigFormat::Toml] {
            let text = config.to_string_pretty(format).unwrap();
            assert_eq!(ConfigLoader::new(format).try_load(text.as_bytes()).unwrap(), config);
        }
    }
}
