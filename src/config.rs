//! Server configuration.
//!
//! Settings come from defaults, then an optional TOML file (`--config`),
//! then command-line flags, each layer overriding the previous one. The
//! result is validated once at startup and never changes afterwards.
//!
//! ```toml
//! port = 6380
//! max_keys = 100000
//! eviction_policy = "allkeys-lfu"
//! epool_sample_size = 10
//! ```

use crate::connection::MAX_BUFFER_SIZE;
use crate::reactor::ReactorConfig;
use crate::storage::{EvictionPolicy, StorageConfig};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

/// Errors while loading or validating configuration. All are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value '{value}' for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum CliAction {
    Run(Config),
    Help,
    Version,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Transport; only "tcp" is supported
    pub protocol: String,
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum number of concurrent client connections
    pub max_connections: usize,
    /// Key count above which eviction runs
    pub max_keys: usize,
    /// Fraction of keys reclaimed per eviction pass, in (0, 1]
    pub eviction_ratio: f64,
    pub eviction_policy: EvictionPolicy,
    /// Capacity of the eviction candidate pool
    pub epool_max_size: usize,
    /// Keys sampled per pool refill
    pub epool_sample_size: usize,
    /// Active expiry interval in milliseconds
    pub expiry_interval_ms: u64,
    /// Largest request, in bytes, a connection may buffer
    pub max_request_size: usize,
    /// One of trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocol: "tcp".to_string(),
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            max_connections: 20_000,
            max_keys: 1_000_000,
            eviction_ratio: 0.1,
            eviction_policy: EvictionPolicy::AllkeysRandom,
            epool_max_size: 16,
            epool_sample_size: 5,
            expiry_interval_ms: 100,
            max_request_size: MAX_BUFFER_SIZE,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Parses a TOML document; missing fields keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses command-line arguments (without the program name).
    ///
    /// `--config <path>` is loaded first wherever it appears, so every other
    /// flag overrides the file.
    pub fn parse_args<I>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();

        if args.iter().any(|a| a == "--help") {
            return Ok(CliAction::Help);
        }
        if args.iter().any(|a| a == "--version" || a == "-v") {
            return Ok(CliAction::Version);
        }

        let mut config = match args.iter().position(|a| a == "--config") {
            Some(i) => {
                let path = args
                    .get(i + 1)
                    .ok_or_else(|| ConfigError::MissingValue("--config".to_string()))?;
                Self::from_file(path)?
            }
            None => Self::default(),
        };

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            let value = || {
                args.get(i + 1)
                    .map(String::as_str)
                    .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
            };

            match flag {
                "--config" => {}
                "--protocol" => config.protocol = value()?.to_string(),
                "--host" | "-h" => config.host = value()?.to_string(),
                "--port" | "-p" => config.port = parse_flag(flag, value()?)?,
                "--max-connections" => config.max_connections = parse_flag(flag, value()?)?,
                "--max-keys" => config.max_keys = parse_flag(flag, value()?)?,
                "--eviction-ratio" => config.eviction_ratio = parse_flag(flag, value()?)?,
                "--eviction-policy" => config.eviction_policy = parse_flag(flag, value()?)?,
                "--epool-max-size" => config.epool_max_size = parse_flag(flag, value()?)?,
                "--epool-sample-size" => config.epool_sample_size = parse_flag(flag, value()?)?,
                "--expiry-interval-ms" => config.expiry_interval_ms = parse_flag(flag, value()?)?,
                "--max-request-size" => config.max_request_size = parse_flag(flag, value()?)?,
                "--log-level" => config.log_level = value()?.to_string(),
                _ => return Err(ConfigError::UnknownArgument(flag.to_string())),
            }
            i += 2;
        }

        config.validate()?;
        Ok(CliAction::Run(config))
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !self.protocol.eq_ignore_ascii_case("tcp") {
            return Err(ConfigError::Invalid(format!(
                "unsupported protocol '{}', only tcp is available",
                self.protocol
            )));
        }
        if self.max_connections == 0 {
            return invalid("max_connections must be at least 1");
        }
        if self.max_keys == 0 {
            return invalid("max_keys must be at least 1");
        }
        if !(self.eviction_ratio > 0.0 && self.eviction_ratio <= 1.0) {
            return invalid("eviction_ratio must be in (0, 1]");
        }
        if self.epool_max_size == 0 {
            return invalid("epool_max_size must be at least 1");
        }
        if self.epool_sample_size == 0 {
            return invalid("epool_sample_size must be at least 1");
        }
        if self.expiry_interval_ms == 0 {
            return invalid("expiry_interval_ms must be at least 1");
        }
        if self.max_request_size < MIN_REQUEST_SIZE {
            return invalid("max_request_size must be at least 1024");
        }
        self.log_level()?;
        Ok(())
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidValue {
            flag: "log_level".to_string(),
            value: self.log_level.clone(),
        })
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            max_keys: self.max_keys,
            eviction_ratio: self.eviction_ratio,
            eviction_policy: self.eviction_policy,
            pool_size: self.epool_max_size,
            sample_size: self.epool_sample_size,
            ..StorageConfig::default()
        }
    }

    pub fn reactor_config(&self) -> ReactorConfig {
        ReactorConfig {
            max_connections: self.max_connections,
            expiry_interval: Duration::from_millis(self.expiry_interval_ms),
            max_request_size: self.max_request_size,
        }
    }

    /// Settings reported by CONFIG GET, using the Redis parameter names
    /// where one exists.
    pub fn params(&self) -> Vec<(String, String)> {
        [
            ("bind", self.host.clone()),
            ("port", self.port.to_string()),
            ("maxclients", self.max_connections.to_string()),
            ("maxkeys", self.max_keys.to_string()),
            ("maxmemory-policy", self.eviction_policy.to_string()),
            ("eviction-ratio", self.eviction_ratio.to_string()),
            ("maxmemory-eviction-pool-size", self.epool_max_size.to_string()),
            ("maxmemory-samples", self.epool_sample_size.to_string()),
            ("hz-interval-ms", self.expiry_interval_ms.to_string()),
            ("client-query-buffer-limit", self.max_request_size.to_string()),
            ("loglevel", self.log_level.clone()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }
}

const MIN_REQUEST_SIZE: usize = 1024;

fn parse_flag<T: FromStr>(flag: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}
