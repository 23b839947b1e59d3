//! Application configuration management.
//!
//! Handles loading and validating lookout configuration including:
//! - Trigger hardware address to watch for
//! - Radio interface and channel plan for passive capture
//! - Station-mode network and retry bounds for Notify sessions
//! - Webhook endpoint for the notification
//! - Mode store location, restart strategy, status LED

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::frame::MacAddr;
use crate::monitor::ChannelPlan;

/// Commented configuration template written on first run.
pub const EXAMPLE_CONFIG: &str = r#"# lookout configuration.
# The device watches passively for `trigger.address` and, once seen, connects
# to `wifi` and calls `notify.url` before returning to watching.

[trigger]
# Hardware (MAC) address of the device to watch for, as sent on the air.
address = "00:11:22:33:44:55"

[radio]
# Monitor-mode capable interface.
interface = "wlan0"
# Channels to watch. A single entry pins the channel; several entries are
# swept round-robin.
channels = [1, 6, 11]
# Dwell time per channel while sweeping.
dwell_ms = 500

[wifi]
# Station-mode network used to deliver the notification.
ssid = "your-network"
passphrase = "your-passphrase"
# One initial attempt plus this many retries.
max_retries = 3
attempt_timeout_secs = 20
retry_delay_ms = 2000

[notify]
url = "https://example.com/hooks/lookout"
method = "POST"
# bearer_token = "secret"
timeout_secs = 10

[store]
path = "/var/lib/lookout/mode"

[restart]
# "process" exits and lets the service supervisor restart us;
# "reboot" restarts the whole device.
strategy = "process"

[indicator]
# LED name under /sys/class/leds; omit to disable.
# led = "ACT"
"#;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config from {}: {source}", path.display())]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be rendered back to TOML.
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    /// The config template could not be written.
    #[error("failed to write config to {}: {source}", path.display())]
    Write {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// A value parsed but does not make sense.
    #[error("invalid config: {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// No config directory could be determined for this platform.
    #[error("cannot determine config directory")]
    NoConfigDir,
}

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// The device to watch for.
    pub trigger: TriggerConfig,

    /// Passive capture radio settings.
    #[serde(default)]
    pub radio: RadioConfig,

    /// Station-mode network for Notify sessions.
    pub wifi: WifiConfig,

    /// Webhook endpoint settings.
    pub notify: NotifyConfig,

    /// Durable mode store location.
    #[serde(default)]
    pub store: StoreConfig,

    /// How a session-ending restart is performed.
    #[serde(default)]
    pub restart: RestartConfig,

    /// Status LED settings.
    #[serde(default)]
    pub indicator: IndicatorConfig,
}

/// The trigger device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Hardware address compared against the sender field of every captured
    /// management frame.
    pub address: MacAddr,
}

/// Passive capture radio settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Monitor-mode capable interface name.
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Channels to watch; one pins the channel, several are swept.
    #[serde(default = "default_channels")]
    pub channels: Vec<u8>,

    /// Dwell time per channel while sweeping.
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            channels: default_channels(),
            dwell_ms: default_dwell_ms(),
        }
    }
}

impl RadioConfig {
    /// The channel plan this configuration describes.
    #[must_use]
    pub fn channel_plan(&self) -> ChannelPlan {
        if self.channels.len() == 1 {
            ChannelPlan::Fixed(self.channels[0])
        } else {
            ChannelPlan::Sweep {
                channels: self.channels.clone(),
                dwell: Duration::from_millis(self.dwell_ms),
            }
        }
    }
}

/// Station-mode network and association bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiConfig {
    /// Network SSID.
    pub ssid: String,

    /// Network passphrase; omit for an open network.
    #[serde(default)]
    pub passphrase: Option<String>,

    /// Retries after the initial attempt; zero means exactly one attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wall-clock ceiling per association attempt.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Fixed delay between consecutive attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Webhook endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Endpoint receiving the one-shot notification.
    pub url: Url,

    /// HTTP method; GET, POST or PUT.
    #[serde(default = "default_method")]
    pub method: String,

    /// Bearer token attached as `Authorization` when present.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Request ceiling.
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

/// Durable mode store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// File holding the persisted operating mode.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// How a session-ending restart is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Restart strategy.
    #[serde(default)]
    pub strategy: RestartStrategy,
}

/// Restart strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartStrategy {
    /// Exit the process and let the service supervisor restart it.
    #[default]
    Process,
    /// Reboot the whole device.
    Reboot,
}

/// Status LED settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// LED name under `/sys/class/leds`; `None` disables the indicator.
    #[serde(default)]
    pub led: Option<String>,
}

impl Config {
    /// Load and validate configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize this configuration to `path`, creating parent directories.
    ///
    /// The agent itself only reads configuration; this exists for
    /// provisioning tooling that assembles and writes a config.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the commented [`EXAMPLE_CONFIG`] template to `path`, creating
    /// parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories or file cannot be written.
    pub fn write_example(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, EXAMPLE_CONFIG).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check invariants that the TOML schema cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger.address == MacAddr::new([0; 6]) {
            return Err(ConfigError::Invalid {
                field: "trigger.address",
                reason: "must not be all-zero".into(),
            });
        }
        if self.trigger.address.is_multicast() {
            return Err(ConfigError::Invalid {
                field: "trigger.address",
                reason: "must be a unicast address".into(),
            });
        }
        if self.radio.interface.is_empty() {
            return Err(ConfigError::Invalid {
                field: "radio.interface",
                reason: "must not be empty".into(),
            });
        }
        if self.radio.channels.is_empty() {
            return Err(ConfigError::Invalid {
                field: "radio.channels",
                reason: "must list at least one channel".into(),
            });
        }
        if self.radio.channels.contains(&0) {
            return Err(ConfigError::Invalid {
                field: "radio.channels",
                reason: "channel numbers start at 1".into(),
            });
        }
        if self.radio.dwell_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "radio.dwell_ms",
                reason: "must be positive".into(),
            });
        }
        if self.wifi.ssid.is_empty() {
            return Err(ConfigError::Invalid {
                field: "wifi.ssid",
                reason: "must not be empty".into(),
            });
        }
        if self.wifi.attempt_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "wifi.attempt_timeout_secs",
                reason: "must be positive".into(),
            });
        }
        if !matches!(self.notify.method.as_str(), "GET" | "POST" | "PUT") {
            return Err(ConfigError::Invalid {
                field: "notify.method",
                reason: format!("'{}' is not one of GET, POST, PUT", self.notify.method),
            });
        }
        if self.notify.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "notify.timeout_secs",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] when no platform config directory
    /// exists.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        // On the appliance: /etc/lookout/config.toml
        // For development: ~/.config/lookout/config.toml
        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from("/etc/lookout/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs =
                directories::ProjectDirs::from("", "", "lookout").ok_or(ConfigError::NoConfigDir)?;
            Ok(dirs.config_dir().join("config.toml"))
        }
    }
}

fn default_interface() -> String {
    "wlan0".into()
}

fn default_channels() -> Vec<u8> {
    vec![1, 6, 11]
}

fn default_dwell_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_attempt_timeout_secs() -> u64 {
    20
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_method() -> String {
    "POST".into()
}

fn default_notify_timeout_secs() -> u64 {
    10
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/var/lib/lookout/mode")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [trigger]
        address = "a4:cf:12:9b:30:01"

        [wifi]
        ssid = "redqueen"

        [notify]
        url = "https://hooks.example.net/lookout"
    "#;

    fn minimal() -> Config {
        toml::from_str(MINIMAL).unwrap()
    }

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config = minimal();
        config.validate().unwrap();
        assert_eq!(config.radio.interface, "wlan0");
        assert_eq!(config.radio.channels, vec![1, 6, 11]);
        assert_eq!(config.radio.dwell_ms, 500);
        assert_eq!(config.wifi.max_retries, 3);
        assert_eq!(config.wifi.attempt_timeout_secs, 20);
        assert_eq!(config.wifi.retry_delay_ms, 2000);
        assert_eq!(config.notify.method, "POST");
        assert_eq!(config.notify.timeout_secs, 10);
        assert_eq!(config.store.path, PathBuf::from("/var/lib/lookout/mode"));
        assert_eq!(config.restart.strategy, RestartStrategy::Process);
        assert_eq!(config.indicator.led, None);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = minimal();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let reparsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc").join("config.toml");
        let mut config = minimal();
        config.wifi.passphrase = Some("hunter22".into());
        config.radio.channels = vec![11];

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_example_config_parses_and_validates() {
        let config: Config = toml::from_str(EXAMPLE_CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.wifi.passphrase.as_deref(), Some("your-passphrase"));
        assert_eq!(config.restart.strategy, RestartStrategy::Process);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.wifi.ssid, "redqueen");
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(&missing),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_write_example_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc").join("config.toml");
        Config::write_example(&path).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.notify.method, "POST");
    }

    #[test]
    fn test_rejects_multicast_trigger() {
        let mut config = minimal();
        config.trigger.address = "ff:ff:ff:ff:ff:ff".parse().unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "trigger.address",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_zero_trigger() {
        let mut config = minimal();
        config.trigger.address = "00:00:00:00:00:00".parse().unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "trigger.address",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_empty_ssid() {
        let mut config = minimal();
        config.wifi.ssid.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "wifi.ssid",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_empty_channel_list() {
        let mut config = minimal();
        config.radio.channels.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "radio.channels",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_unknown_method() {
        let mut config = minimal();
        config.notify.method = "BREW".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("BREW"));
    }

    #[test]
    fn test_single_channel_pins_the_plan() {
        let mut config = minimal();
        config.radio.channels = vec![11];
        assert_eq!(config.radio.channel_plan(), ChannelPlan::Fixed(11));
    }

    #[test]
    fn test_several_channels_sweep() {
        let config = minimal();
        assert_eq!(
            config.radio.channel_plan(),
            ChannelPlan::Sweep {
                channels: vec![1, 6, 11],
                dwell: Duration::from_millis(500),
            }
        );
    }
}
