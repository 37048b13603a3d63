//! Layered configuration for `server_relay`: built-in defaults, then the JSON
//! config file, then environment variables and CLI flags (clap reads both).

use anyhow::Context;
use clap::Parser;
use lib_relay::config::{
    DEFAULT_CREDENTIAL_HEADER, DEFAULT_QUEUE_CAPACITY, DEFAULT_RETRY_DELAY, DEFAULT_SHUTDOWN_GRACE,
};
use lib_relay::RelayOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up when `--config-path` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "server_relay.conf";
/// Default listen port.
pub const DEFAULT_PORT: u16 = 9003;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "ReStream live-event relay", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "RELAY_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "RELAY_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "RELAY_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "RELAY_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "RELAY_UPSTREAM_URL", help = "Upstream text/event-stream URL.")]
    pub upstream_url: Option<String>,

    #[clap(long, env = "RELAY_API_KEY", hide_env_values = true, help = "Credential sent to the upstream.")]
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    #[clap(long, env = "RELAY_API_KEY_HEADER", help = "Header that carries the credential.")]
    pub api_key_header: Option<String>,

    #[clap(long, env = "RELAY_RETRY_DELAY_MS", help = "Delay in milliseconds between upstream connection attempts.")]
    pub retry_delay_ms: Option<u64>,

    #[clap(long, env = "RELAY_QUEUE_CAPACITY", help = "Messages buffered per subscriber before drops start.")]
    pub queue_capacity: Option<usize>,

    #[clap(long, env = "RELAY_SHUTDOWN_GRACE_MS", help = "Milliseconds allowed for in-flight work on shutdown.")]
    pub shutdown_grace_ms: Option<u64>,
}

impl Config {
    // 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            upstream_url: other.upstream_url.or(self.upstream_url),
            api_key: other.api_key.or(self.api_key),
            api_key_header: other.api_key_header.or(self.api_key_header),
            retry_delay_ms: other.retry_delay_ms.or(self.retry_delay_ms),
            queue_capacity: other.queue_capacity.or(self.queue_capacity),
            shutdown_grace_ms: other.shutdown_grace_ms.or(self.shutdown_grace_ms),
        }
    }

    fn defaults() -> Config {
        Config {
            port: Some(DEFAULT_PORT),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            api_key_header: Some(DEFAULT_CREDENTIAL_HEADER.to_string()),
            retry_delay_ms: Some(DEFAULT_RETRY_DELAY.as_millis() as u64),
            queue_capacity: Some(DEFAULT_QUEUE_CAPACITY),
            shutdown_grace_ms: Some(DEFAULT_SHUTDOWN_GRACE.as_millis() as u64),
            ..Default::default()
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn log_dir(&self) -> &Path {
        self.log_dir.as_deref().unwrap_or(Path::new("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// The credential, empty when none is configured. An empty credential is
    /// rejected by the relay itself.
    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    pub fn upstream_url(&self) -> anyhow::Result<&str> {
        self.upstream_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .context("no upstream URL configured (--upstream-url / RELAY_UPSTREAM_URL)")
    }

    pub fn relay_options(&self) -> RelayOptions {
        let defaults = RelayOptions::default();
        RelayOptions {
            retry_delay: self.retry_delay_ms.map(Duration::from_millis).unwrap_or(defaults.retry_delay),
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            credential_header: self.api_key_header.clone().unwrap_or(defaults.credential_header),
            shutdown_grace: self
                .shutdown_grace_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_grace),
            handle_signals: true,
        }
    }
}

/// Reads a config file. A missing file is not an error; an unreadable or
/// malformed one is.
fn read_file_config(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let file_config = serde_json::from_str::<Config>(&config_str)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(Some(file_config))
}

/// Layers defaults, the config file named by `cli` (or the default file) and
/// `cli` itself, in that order.
pub fn resolve(cli: Config) -> anyhow::Result<Config> {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_file_config(&config_file_path)? {
        current_config = current_config.merge(file_config);
    }
    Ok(current_config.merge(cli))
}

/// Parses env and CLI, then resolves the full configuration.
pub fn load_config() -> anyhow::Result<Config> {
    resolve(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_file_or_flags() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Config {
            config_path: Some(dir.path().join("absent.conf")),
            ..Default::default()
        };
        let config = resolve(cli).unwrap();

        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.api_key(), "");
        assert!(config.upstream_url().is_err());
        assert_eq!(config.relay_options(), RelayOptions::default());
    }

    #[test]
    fn cli_overrides_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"port": 7000, "upstreamUrl": "http://file/stream", "retryDelayMs": 1500, "apiKeyHeader": "X-Token"}}"#
        )
        .unwrap();

        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            port: Some(8000),
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        let config = resolve(cli).unwrap();

        assert_eq!(config.port(), 8000);
        assert_eq!(config.upstream_url().unwrap(), "http://file/stream");
        assert_eq!(config.api_key(), "k");

        let options = config.relay_options();
        assert_eq!(options.retry_delay, Duration::from_millis(1500));
        assert_eq!(options.credential_header, "X-Token");
        assert_eq!(options.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(resolve(cli).is_err());
    }

    #[test]
    fn credential_is_never_serialized() {
        let config = Config {
            api_key: Some("secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn blank_upstream_url_is_rejected() {
        let config = Config {
            upstream_url: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(config.upstream_url().is_err());
    }
}
