//! Layered configuration
//!
//! Precedence, lowest first: built-in defaults, TOML file (`--config` or
//! `<config dir>/gemini-mcp/config.toml`), environment variables, command-line
//! flags. Flags are applied by the binary after [`Config::load`].

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::ai::client::{GeminiClientConfig, DEFAULT_BASE_URL};
use crate::ai::retry::RetryConfig;

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_BASE_URL: &str = "GEMINI_BASE_URL";
pub const ENV_HOST: &str = "MCP_HOST";
pub const ENV_PORT: &str = "MCP_PORT";
pub const ENV_AUTH_TOKEN: &str = "MCP_AUTH_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Gemini API key is not set (use {ENV_API_KEY} or [gemini] api_key)")]
    MissingApiKey,

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Cannot resolve listen address {0}")]
    UnresolvableAddress(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub gemini: GeminiSettings,
    pub server: ServerSettings,
    pub retry: RetrySettings,
}

#[derive(Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

impl fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Bearer token required by the network transports
    pub auth_token: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3005,
            auth_token: None,
        }
    }
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// Non-empty value of an environment variable
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    /// `<config dir>/gemini-mcp/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gemini-mcp").join("config.toml"))
    }

    /// Defaults, then the config file, then the process environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    pub fn load_with<F>(explicit: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override settings from environment variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = non_empty(lookup(ENV_API_KEY)) {
            self.gemini.api_key = Some(key);
        }
        if let Some(url) = non_empty(lookup(ENV_BASE_URL)) {
            self.gemini.base_url = url;
        }
        if let Some(host) = non_empty(lookup(ENV_HOST)) {
            self.server.host = host;
        }
        if let Some(port) = non_empty(lookup(ENV_PORT)) {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_PORT.to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(token) = non_empty(lookup(ENV_AUTH_TOKEN)) {
            self.server.auth_token = Some(token);
        }
        Ok(())
    }

    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.gemini
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Check everything a running server needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_key()?;
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry.max_attempts".to_string(),
                value: "0".to_string(),
            });
        }
        if self.gemini.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "gemini.timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn client_config(&self) -> Result<GeminiClientConfig, ConfigError> {
        Ok(GeminiClientConfig {
            api_key: self.api_key()?.to_string(),
            base_url: self.gemini.base_url.clone(),
            timeout: Duration::from_secs(self.gemini.timeout_secs),
        })
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let target = format!("{}:{}", self.server.host, self.server.port);
        (self.server.host.as_str(), self.server.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(ConfigError::UnresolvableAddress(target))
    }
}
