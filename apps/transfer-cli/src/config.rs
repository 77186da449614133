//! CLI configuration defaults.
//!
//! Stored as TOML:
//! - Linux: `~/.config/byteferry/transfer.toml`
//! - Windows: `%APPDATA%/byteferry/transfer.toml`
//!
//! Every value can be overridden on the command line; a missing file
//! just means built-in defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Defaults applied when the corresponding CLI flag is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host the receiver binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port the receiver listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Read timeout in seconds, used when `--timeout` is given without
    /// a value.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    9977
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, falling back to defaults when
    /// the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("byteferry")
            .join("transfer.toml")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("byteferry").join("transfer.toml")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp/byteferry/transfer.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 9977);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = Config {
            bind: "127.0.0.1".into(),
            port: 4242,
            timeout_secs: 5,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.bind, config.bind);
        assert_eq!(parsed.port, config.port);
        assert_eq!(parsed.timeout_secs, config.timeout_secs);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str("port = 1234").unwrap();
        assert_eq!(parsed.port, 1234);
        assert_eq!(parsed.bind, "0.0.0.0");
        assert_eq!(parsed.timeout_secs, 30);
    }
}
