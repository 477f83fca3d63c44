use crate::defaults;
use crate::error::{Result, VocapError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub recognition: RecognitionConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; `None` selects the system default.
    pub device: Option<String>,
    /// Sample rate in Hz. The service contract pins this to 16000.
    pub sample_rate: u32,
    /// Channel count. The service contract pins this to 1.
    pub channels: u16,
    /// Frame granularity in milliseconds.
    pub frame_ms: u32,
}

/// Recognition service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    /// WebSocket endpoint of the streaming transcription service.
    pub endpoint: String,
    /// HTTP endpoint of the one-shot "recognize file" service.
    pub batch_endpoint: String,
    /// Application key sent in every control message header.
    pub appkey: String,
    /// Bearer credential appended to the connection URL.
    pub token: String,
    /// Bound on the post-stop wait for transcription completion.
    pub completion_timeout_ms: u64,
    /// Grace period before a forced stop, honored by layers above this
    /// subsystem; carried here so one config file describes the feature.
    pub auto_stop_delay_ms: u64,
    /// Retain captured frames for container export. Disable to save memory
    /// when only a live transcript is needed.
    pub enable_container_export: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            frame_ms: defaults::FRAME_MS,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            batch_endpoint: String::new(),
            appkey: String::new(),
            token: String::new(),
            completion_timeout_ms: defaults::COMPLETION_TIMEOUT_MS,
            auto_stop_delay_ms: 0,
            enable_container_export: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if the file is
    /// missing. Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - VOCAP_ENDPOINT → recognition.endpoint
    /// - VOCAP_BATCH_ENDPOINT → recognition.batch_endpoint
    /// - VOCAP_APPKEY → recognition.appkey
    /// - VOCAP_TOKEN → recognition.token
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("VOCAP_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.recognition.endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("VOCAP_BATCH_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.recognition.batch_endpoint = endpoint;
        }
        if let Ok(appkey) = std::env::var("VOCAP_APPKEY")
            && !appkey.is_empty()
        {
            self.recognition.appkey = appkey;
        }
        if let Ok(token) = std::env::var("VOCAP_TOKEN")
            && !token.is_empty()
        {
            self.recognition.token = token;
        }
        self
    }

    /// Validate values the service contract pins.
    ///
    /// # Errors
    /// Returns `VocapError::ConfigInvalidValue` for a sample rate other
    /// than 16000, a channel count other than 1, or a zero frame size.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate != defaults::SAMPLE_RATE {
            return Err(VocapError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: format!(
                    "must be {} (got {})",
                    defaults::SAMPLE_RATE,
                    self.audio.sample_rate
                ),
            });
        }
        if self.audio.channels != defaults::CHANNELS {
            return Err(VocapError::ConfigInvalidValue {
                key: "audio.channels".to_string(),
                message: format!("must be {} (got {})", defaults::CHANNELS, self.audio.channels),
            });
        }
        if self.audio.frame_ms == 0 {
            return Err(VocapError::ConfigInvalidValue {
                key: "audio.frame_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.frame_ms, 40);
        assert!(config.recognition.enable_container_export);
        assert_eq!(config.recognition.completion_timeout_ms, 1500);
    }

    #[test]
    fn validate_rejects_wrong_sample_rate() {
        let mut config = Config::default();
        config.audio.sample_rate = 44100;
        match config.validate() {
            Err(VocapError::ConfigInvalidValue { key, .. }) => {
                assert_eq!(key, "audio.sample_rate");
            }
            other => panic!("Expected ConfigInvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn validate_rejects_stereo() {
        let mut config = Config::default();
        config.audio.channels = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_frame_ms() {
        let mut config = Config::default();
        config.audio.frame_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_parses_partial_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[recognition]
endpoint = "wss://example.invalid/ws/v1"
appkey = "key123"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.recognition.endpoint, "wss://example.invalid/ws/v1");
        assert_eq!(config.recognition.appkey, "key123");
        // Unspecified sections fall back to defaults
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.recognition.completion_timeout_ms, 1500);
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not = valid [toml").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn load_or_default_returns_defaults_for_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/vocap.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        // SAFETY: single-threaded with respect to these variables; no other
        // test reads or writes them.
        unsafe {
            std::env::set_var("VOCAP_ENDPOINT", "wss://override.invalid/ws/v1");
            std::env::set_var("VOCAP_TOKEN", "env-token");
        }
        let config = Config::default().with_env_overrides();
        unsafe {
            std::env::remove_var("VOCAP_ENDPOINT");
            std::env::remove_var("VOCAP_TOKEN");
        }

        assert_eq!(config.recognition.endpoint, "wss://override.invalid/ws/v1");
        assert_eq!(config.recognition.token, "env-token");
        // Variables not set stay at their file/default values.
        assert!(config.recognition.appkey.is_empty());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = Config::default();
        config.recognition.token = "secret".to_string();
        config.audio.frame_ms = 20;

        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }
}
