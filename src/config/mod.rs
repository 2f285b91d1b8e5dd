//! Configuration management for the session sync gateway
//!
//! Handles loading, parsing, validation and hot-reloading of YAML
//! configuration files.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

use crate::protocol::framing::{DEFAULT_DEVICE_ID, DEFAULT_MAX_CHUNK_BYTES};
use crate::protocol::WireSettings;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub handshake: HandshakeConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// MIDI port configuration (case-insensitive name substrings)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
}

/// SysEx framing parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_device_id")]
    pub device_id: u8,
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
}

/// Periodic sync loop
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

/// Handshake and view-state notes. Channels are raw (0-15).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HandshakeConfig {
    #[serde(default = "default_handshake_channel")]
    pub channel: u8,
    #[serde(default = "default_connect_note")]
    pub connect_note: u8,
    #[serde(default = "default_resend_note")]
    pub resend_note: u8,
    #[serde(default = "default_device_view_note")]
    pub device_view_note: u8,
    #[serde(default = "default_mixer_view_note")]
    pub mixer_view_note: u8,
    #[serde(default = "default_confirm_channel")]
    pub confirm_channel: u8,
    #[serde(default = "default_confirm_note")]
    pub confirm_note: u8,
    #[serde(default = "default_confirm_velocity")]
    pub confirm_velocity: u8,
}

/// In-memory session used when no DAW is attached
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionConfig {
    pub fixture: PathBuf,
}

/// Rolling log file output
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            max_chunk_bytes: default_max_chunk_bytes(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            channel: default_handshake_channel(),
            connect_note: default_connect_note(),
            resend_note: default_resend_note(),
            device_view_note: default_device_view_note(),
            mixer_view_note: default_mixer_view_note(),
            confirm_channel: default_confirm_channel(),
            confirm_note: default_confirm_note(),
            confirm_velocity: default_confirm_velocity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;

        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        for (name, port) in [
            ("input_port", &self.midi.input_port),
            ("output_port", &self.midi.output_port),
        ] {
            if matches!(port, Some(p) if p.trim().is_empty()) {
                anyhow::bail!("MIDI {} cannot be empty (omit it instead)", name);
            }
        }

        if self.protocol.device_id > 0x7F {
            anyhow::bail!(
                "protocol.device_id {:#04X} is not a 7-bit value",
                self.protocol.device_id
            );
        }
        if self.protocol.max_chunk_bytes == 0 {
            anyhow::bail!("protocol.max_chunk_bytes must be at least 1");
        }

        if self.sync.interval_ms < 10 {
            anyhow::bail!(
                "sync.interval_ms {} is too small (minimum 10)",
                self.sync.interval_ms
            );
        }

        let hs = &self.handshake;
        for (name, channel) in [("channel", hs.channel), ("confirm_channel", hs.confirm_channel)] {
            if channel > 15 {
                anyhow::bail!("handshake.{} {} is invalid (must be 0-15)", name, channel);
            }
        }
        let notes = [
            ("connect_note", hs.connect_note),
            ("resend_note", hs.resend_note),
            ("device_view_note", hs.device_view_note),
            ("mixer_view_note", hs.mixer_view_note),
            ("confirm_note", hs.confirm_note),
            ("confirm_velocity", hs.confirm_velocity),
        ];
        for (name, value) in notes {
            if value > 127 {
                anyhow::bail!("handshake.{} {} is invalid (must be 0-127)", name, value);
            }
        }

        let listened = [
            hs.connect_note,
            hs.resend_note,
            hs.device_view_note,
            hs.mixer_view_note,
        ];
        for (i, note) in listened.iter().enumerate() {
            if listened[i + 1..].contains(note) {
                anyhow::bail!("handshake note {} is assigned twice", note);
            }
        }

        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync.interval_ms)
    }

    pub fn wire(&self) -> WireSettings {
        WireSettings {
            device_id: self.protocol.device_id,
            max_chunk_bytes: self.protocol.max_chunk_bytes,
        }
    }
}

// Default value functions
fn default_device_id() -> u8 { DEFAULT_DEVICE_ID }
fn default_max_chunk_bytes() -> usize { DEFAULT_MAX_CHUNK_BYTES }
fn default_interval_ms() -> u64 { 300 }
fn default_handshake_channel() -> u8 { 15 }
fn default_connect_note() -> u8 { 94 }
fn default_resend_note() -> u8 { 88 }
fn default_device_view_note() -> u8 { 89 }
fn default_mixer_view_note() -> u8 { 90 }
fn default_confirm_channel() -> u8 { 3 }
fn default_confirm_note() -> u8 { 1 }
fn default_confirm_velocity() -> u8 { 100 }
fn default_log_prefix() -> String { "session-sync-gw.log".to_string() }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.protocol.device_id, 0x01);
        assert_eq!(config.protocol.max_chunk_bytes, 250);
        assert_eq!(config.sync_interval(), Duration::from_millis(300));
        assert_eq!(config.handshake.connect_note, 94);
        assert_eq!(config.handshake.confirm_channel, 3);
        assert!(config.midi.input_port.is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
midi:
  input_port: "IAC Bus 1"
  output_port: "IAC Bus 2"
protocol:
  device_id: 2
  max_chunk_bytes: 120
sync:
  interval_ms: 500
session:
  fixture: demo/session.yaml
logging:
  directory: logs
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.midi.input_port.as_deref(), Some("IAC Bus 1"));
        assert_eq!(
            config.wire(),
            WireSettings {
                device_id: 2,
                max_chunk_bytes: 120
            }
        );
        assert_eq!(config.sync.interval_ms, 500);
        assert_eq!(
            config.session.unwrap().fixture,
            PathBuf::from("demo/session.yaml")
        );
        assert_eq!(config.logging.unwrap().file_prefix, "session-sync-gw.log");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(AppConfig::from_yaml_str("protocol: { device_id: 200 }").is_err());
        assert!(AppConfig::from_yaml_str("protocol: { max_chunk_bytes: 0 }").is_err());
        assert!(AppConfig::from_yaml_str("sync: { interval_ms: 1 }").is_err());
        assert!(AppConfig::from_yaml_str("handshake: { channel: 16 }").is_err());
        assert!(AppConfig::from_yaml_str("handshake: { resend_note: 94 }").is_err());
        assert!(AppConfig::from_yaml_str("midi: { input_port: '' }").is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sync:\n  interval_ms: 250\n").unwrap();

        let config = AppConfig::load(&path.to_string_lossy()).await.unwrap();
        assert_eq!(config.sync.interval_ms, 250);

        let missing = dir.path().join("missing.yaml");
        assert!(AppConfig::load(&missing.to_string_lossy()).await.is_err());
    }
}
