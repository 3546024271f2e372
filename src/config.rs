//! Layered server configuration.
//!
//! Values are resolved in order, later layers winning:
//! built-in defaults, an optional TOML file, `NKAPI_*` environment variables
//! and finally command-line flags (applied by the CLI).
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! debug = false
//!
//! [cors]
//! allowed_origins = ["https://app.example"]
//! max_age = 600
//!
//! [log]
//! level = "debug"
//! format = "json"
//! ```

use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::logging::LogConfig;
use crate::middleware::{CorsConfigError, CorsPolicy, CorsPolicyBuilder};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

/// Error loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read
    Io { path: PathBuf, source: io::Error },
    /// The config file is not valid TOML for [`ServerConfig`]
    Parse { path: PathBuf, message: String },
    /// An environment variable holds an unusable value
    InvalidEnv { key: String, value: String },
    /// The `[cors]` section does not describe a valid policy
    Cors(CorsConfigError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config file {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "invalid config file {}: {}", path.display(), message)
            }
            ConfigError::InvalidEnv { key, value } => {
                write!(f, "invalid value '{}' for environment variable {}", value, key)
            }
            ConfigError::Cors(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Cors(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CorsConfigError> for ConfigError {
    fn from(e: CorsConfigError) -> Self {
        ConfigError::Cors(e)
    }
}

/// `[cors]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub origin_patterns: Vec<String>,
    /// Defaults to `Content-Type, Authorization` when unset
    pub allowed_headers: Option<Vec<String>>,
    pub allow_credentials: bool,
    pub expose_headers: Vec<String>,
    pub max_age: Option<u32>,
}

impl CorsConfig {
    pub fn to_policy(&self) -> Result<CorsPolicy, CorsConfigError> {
        let mut builder = CorsPolicyBuilder::new()
            .allowed_origins(&self.allowed_origins)
            .origin_patterns(&self.origin_patterns)
            .allow_credentials(self.allow_credentials)
            .expose_headers(&self.expose_headers);
        if let Some(headers) = &self.allowed_headers {
            builder = builder.allowed_headers(headers);
        }
        if let Some(max_age) = self.max_age {
            builder = builder.max_age(max_age);
        }
        builder.build()
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// `0` asks the OS for a free port
    pub port: u16,
    pub debug: bool,
    pub cors: Option<CorsConfig>,
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            debug: true,
            cors: None,
            log: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Read a TOML file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    /// Overlay `NKAPI_HOST`, `NKAPI_PORT`, `NKAPI_DEBUG` and the
    /// `NKAPI_LOG_*` variables found through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("NKAPI_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("NKAPI_PORT") {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "NKAPI_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(debug) = lookup("NKAPI_DEBUG") {
            self.debug = parse_flag(&debug).ok_or_else(|| ConfigError::InvalidEnv {
                key: "NKAPI_DEBUG".to_string(),
                value: debug.clone(),
            })?;
        }
        self.log.apply_env(&lookup);
        Ok(())
    }

    /// Build the configured CORS policy, if any.
    pub fn cors_policy(&self) -> Result<Option<CorsPolicy>, ConfigError> {
        match &self.cors {
            Some(cors) => Ok(Some(cors.to_policy()?)),
            None => Ok(None),
        }
    }

    /// `host:port` as passed to the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Accepts `1/0`, `true/false`, `yes/no` and `on/off`.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
