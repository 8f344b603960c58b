//! CLI Configuration
//!
//! Configuration for the `safety-link` tool, read from
//! `~/.config/safety-link/config.toml` unless `--config` points elsewhere.

use anyhow::{Context, Result};
use safety_link_protocol::{PreSharedKey, SessionConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-state deadline applied when the config has no `[session]` table
pub const DEFAULT_STATE_TIMEOUT_SECS: u64 = 30;

/// Tool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Pre-shared key as 32 hex characters (built-in key if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Handshake policies
    #[serde(default = "default_session")]
    pub session: SessionConfig,

    /// Bluetooth configuration
    #[serde(default)]
    pub bluetooth: BluetoothConfig,
}

/// Bluetooth configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothConfig {
    /// Adapter name, e.g. `hci0` (BlueZ default adapter if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,

    /// Timeout for connecting and resolving GATT services, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_session() -> SessionConfig {
    SessionConfig::default().with_state_timeout(Duration::from_secs(DEFAULT_STATE_TIMEOUT_SECS))
}

fn default_connect_timeout() -> u64 {
    15
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl BluetoothConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key: None,
            session: default_session(),
            bluetooth: BluetoothConfig::default(),
        }
    }
}

impl Config {
    /// `<config dir>/safety-link/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("safety-link")
            .join("config.toml")
    }

    /// Load configuration, falling back to defaults if the file is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        // Reject a bad key at load time rather than mid-handshake
        config.pre_shared_key()?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Key used for the handshake
    pub fn pre_shared_key(&self) -> Result<PreSharedKey> {
        match &self.key {
            Some(hex) => PreSharedKey::from_hex(hex).context("Invalid pre-shared key in config"),
            None => Ok(PreSharedKey::DEFAULT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safety_link_protocol::{FrameLayout, WriteFailurePolicy};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.key.is_none());
        assert_eq!(
            config.session.state_timeout(),
            Some(Duration::from_secs(DEFAULT_STATE_TIMEOUT_SECS))
        );
        assert_eq!(config.bluetooth.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.pre_shared_key().unwrap(), PreSharedKey::DEFAULT);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_session_table() {
        let parsed: Config = toml::from_str(
            r#"
            key = "000102030405060708090a0b0c0d0e0f"

            [session]
            frame_layout = "padded"
            write_failure = "fail"
            max_link_errors = 0

            [bluetooth]
            adapter = "hci1"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.session.frame_layout, FrameLayout::Padded);
        assert_eq!(parsed.session.write_failure, WriteFailurePolicy::Fail);
        assert_eq!(parsed.session.max_link_errors, 0);
        // An explicit [session] table without a deadline means none
        assert_eq!(parsed.session.state_timeout(), None);
        assert_eq!(parsed.bluetooth.adapter.as_deref(), Some("hci1"));
        assert_eq!(parsed.bluetooth.connect_timeout_secs, 15);

        let expected: [u8; 16] = core::array::from_fn(|i| i as u8);
        assert_eq!(parsed.pre_shared_key().unwrap().as_bytes(), &expected);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.bluetooth.adapter = Some("hci0".to_string());
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "key = \"f5d2\"\n").unwrap();

        assert!(Config::load(&path).is_err());
    }
}
