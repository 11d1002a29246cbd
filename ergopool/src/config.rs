//! Daemon configuration.
//!
//! Read from a TOML file; every field has a default so an empty or absent
//! file yields a working solo-mining setup against a local node.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::counter::MAX_EXTRA_NONCE1_SIZE;
use crate::error::{Error, Result};
use crate::u256::U256;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the Stratum listener binds.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// How long a fresh connection may stay silent before being closed.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Node REST API base, trailing slash required.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Candidate poll period.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Connection nonce-prefix width in bytes, 1 through 4.
    #[serde(default = "default_extra_nonce1_size")]
    pub extra_nonce1_size: usize,
    #[serde(default = "default_difficulty_multiplier")]
    pub difficulty_multiplier: u64,
    /// Share acceptance threshold tau, a decimal integer.
    #[serde(default = "default_pool_target")]
    pub pool_target: String,
    #[serde(default)]
    pub use_collateral: bool,
    /// Send job announcements with tau scaled down by 1000.
    #[serde(default)]
    pub reduced_share_messages: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            extra_nonce1_size: default_extra_nonce1_size(),
            difficulty_multiplier: default_difficulty_multiplier(),
            pool_target: default_pool_target(),
            use_collateral: false,
            reduced_share_messages: false,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:4444".into()
}

fn default_connection_timeout_ms() -> u64 {
    60_000
}

fn default_api_url() -> String {
    "http://127.0.0.1:9052/".into()
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_extra_nonce1_size() -> usize {
    4
}

fn default_difficulty_multiplier() -> u64 {
    256
}

/// Default tau: 2^256 divided by 2*10^7.
fn default_pool_target() -> String {
    (U256::MAX / 20_000_000u64).to_string()
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Missing file means defaults; a present but invalid file is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if !self.node.api_url.ends_with('/') {
            return Err(Error::Config(format!(
                "node api url must end with a slash: {}",
                self.node.api_url
            )));
        }
        if self.node.poll_interval_ms == 0 {
            return Err(Error::Config("poll interval must be positive".into()));
        }
        if !(1..=MAX_EXTRA_NONCE1_SIZE).contains(&self.pool.extra_nonce1_size) {
            return Err(Error::Config(format!(
                "extraNonce1 size must be between 1 and {MAX_EXTRA_NONCE1_SIZE}, got {}",
                self.pool.extra_nonce1_size
            )));
        }
        if self.pool.difficulty_multiplier == 0 {
            return Err(Error::Config("difficulty multiplier must be positive".into()));
        }
        self.pool_target()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server
            .listen
            .parse()
            .map_err(|_| Error::Config(format!("invalid listen address: {}", self.server.listen)))
    }

    pub fn pool_target(&self) -> Result<U256> {
        self.pool
            .pool_target
            .parse()
            .map_err(|_| Error::Config(format!("invalid pool target: {}", self.pool.pool_target)))
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.server.connection_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.node.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.listen_addr().unwrap().port(), 4444);
        assert_eq!(config.connection_timeout(), Duration::from_secs(60));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.pool_target().unwrap() > U256::from(u64::MAX));
    }

    #[test]
    fn test_toml_overrides() {
        let config: Config = toml::from_str(
            r#"
            [server]
            listen = "127.0.0.1:9999"
            connection_timeout_ms = 5000

            [node]
            api_url = "http://10.0.0.5:9052/"
            api_key = "hunter2"

            [pool]
            extra_nonce1_size = 2
            pool_target = "600000"
            reduced_share_messages = true
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.listen_addr().unwrap().port(), 9999);
        assert_eq!(config.node.api_key.as_deref(), Some("hunter2"));
        assert_eq!(config.pool.extra_nonce1_size, 2);
        assert_eq!(config.pool_target().unwrap(), U256::from(600_000u64));
        assert!(config.pool.reduced_share_messages);
        // Sections not mentioned keep their defaults.
        assert_eq!(config.pool.difficulty_multiplier, 256);
    }

    #[test]
    fn test_api_url_requires_trailing_slash() {
        let mut config = Config::default();
        config.node.api_url = "http://127.0.0.1:9052".into();
        assert!(config.validate().is_err());
    }

    #[test_case(0 ; "zero")]
    #[test_case(5 ; "wider than the nonce leaves room for")]
    fn test_extra_nonce1_size_rejected(size: usize) {
        let mut config = Config::default();
        config.pool.extra_nonce1_size = size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_listen_address_rejected() {
        let mut config = Config::default();
        config.server.listen = "not-an-address".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_pool_target_rejected() {
        let mut config = Config::default();
        config.pool.pool_target = "0x123".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default(Path::new("/nonexistent/ergopool.toml")).unwrap();
        assert_eq!(config.pool.extra_nonce1_size, 4);
    }
}
