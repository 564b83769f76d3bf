//! # MPDash Configuration Module
//!
//! This module provides configuration management for MPDash, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides (generic and short deployment aliases)
//! - Type-safe getters for configuration values
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use mpdashconfig::get_config;
//!
//! let config = get_config();
//!
//! let mpd = format!("{}:{}", config.get_mpd_host(), config.get_mpd_port());
//! let prefix = config.get_path_prefix();
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tracing::{info, warn};

// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("mpdash.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load MPDash configuration"));
}

const ENV_CONFIG_DIR: &str = "MPDASH_CONFIG";
const ENV_PREFIX: &str = "MPDASH_CONFIG__";

/// Short environment variables accepted on top of the generic `MPDASH_CONFIG__A__B` form.
const ENV_ALIASES: &[(&str, &[&str])] = &[
    ("MPDASH_MPD_HOST", &["mpd", "host"]),
    ("MPDASH_MPD_PORT", &["mpd", "port"]),
    ("MPDASH_MPD_TIMEOUT", &["mpd", "timeout_secs"]),
    ("MPDASH_LISTEN_ADDRESS", &["host", "listen_address"]),
    ("MPDASH_LISTEN_PORT", &["host", "http_port"]),
    ("MPDASH_PATH_PREFIX", &["host", "path_prefix"]),
    ("MPDASH_FILES_URL", &["host", "files_url"]),
];

// Default values for configuration
const DEFAULT_HTTP_PORT: u16 = 8010;
const DEFAULT_MPD_PORT: u16 = 6600;
const DEFAULT_MPD_HOST: &str = "localhost";
const DEFAULT_MPD_TIMEOUT_SECS: usize = 10;
const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";
const DEFAULT_PATH_PREFIX: &str = "/mpd";
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

/// Macro to generate a getter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> usize {
            match self.get_value($path) {
                Ok(Value::Number(n)) => n.as_u64().map(|v| v as usize).unwrap_or($default),
                Ok(Value::String(s)) => s.trim().parse().unwrap_or($default),
                _ => $default,
            }
        }
    };
}

/// Macro to generate a getter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }
    };
}

/// Macro to generate a getter for string values with default
macro_rules! impl_string_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            match self.get_value($path) {
                Ok(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                Ok(Value::Number(n)) => n.to_string(),
                _ => $default.to_string(),
            }
        }
    };
}

/// Configuration manager for MPDash
///
/// Holds the merged YAML tree (embedded defaults, `config.yaml`, environment) and the
/// file it is persisted to. An in-memory configuration (see [`Config::from_yaml_str`])
/// has no backing file and never touches the disk.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: Option<String>,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.lock().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var=ENV_CONFIG_DIR, path=%env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(".mpdash").exists() {
            return ".mpdash".to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(".mpdash");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        ".mpdash".to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("The specified path is not a directory"));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `MPDASH_CONFIG` environment variable
    /// 3. `.mpdash` in the current directory
    /// 4. `.mpdash` in the user's home directory
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir=%config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let external = match fs::read_to_string(&path) {
            Ok(data) => {
                info!(config_file=%path, "Loaded config file");
                Some(data)
            }
            Err(_) => {
                info!(config_file=%path, "Config file not found, using default embedded config");
                None
            }
        };

        let mut config_value = Self::merged_value(external.as_deref())?;
        Self::apply_env_overrides(&mut config_value, env::vars());

        let config = Config {
            config_dir,
            path: Some(path),
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Builds an in-memory configuration from a YAML document merged over the defaults.
    ///
    /// Environment variables are not consulted and nothing is written to disk.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(Config {
            config_dir: String::new(),
            path: None,
            data: Mutex::new(Self::merged_value(Some(yaml))?),
        })
    }

    fn merged_value(external: Option<&str>) -> Result<Value> {
        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        if let Some(yaml) = external {
            let external_value: Value = serde_yaml::from_str(yaml)?;
            merge_yaml(&mut default_value, &external_value);
        }
        Ok(Self::lower_keys_value(default_value))
    }

    fn lock(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Directory holding `config.yaml` (empty for in-memory configurations)
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let yaml = serde_yaml::to_string(&*self.lock())?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["host", "http_port"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.lock();
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        Self::get_value_internal(&self.lock(), path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                if let Some(next) = map.get(&Value::String(key.to_lowercase())) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    /// Applies `MPDASH_CONFIG__A__B=value` overrides and the short aliases of `ENV_ALIASES`.
    fn apply_env_overrides<I>(config: &mut Value, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let yaml_value = Self::convert_env_value(&value);
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                if let Err(err) = Self::set_value_internal(config, &key_path, yaml_value) {
                    warn!(env_var = %key, error = %err, "Ignoring environment override");
                }
            } else if let Some((_, path)) = ENV_ALIASES.iter().find(|(name, _)| *name == key) {
                if let Err(err) = Self::set_value_internal(config, path, yaml_value) {
                    warn!(env_var = %key, error = %err, "Ignoring environment override");
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    fn get_port(&self, path: &[&str], default: u16) -> u16 {
        match self.get_value(path) {
            Ok(Value::Number(n)) => match n.as_u64().and_then(|v| u16::try_from(v).ok()) {
                Some(port) => port,
                None => {
                    tracing::warn!("Invalid port {} at {}, using default {}", n, path.join("."), default);
                    default
                }
            },
            Ok(Value::String(s)) => s.trim().parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!("Invalid port '{}' at {}, using default {}", s, path.join("."), default);
                default
            }),
            Ok(_) => {
                tracing::warn!(
                    "Port at {} not a number or string, using default {}",
                    path.join("."),
                    default
                );
                default
            }
            Err(err) => {
                tracing::warn!("Failed to get port: {}, using default {}", err, default);
                default
            }
        }
    }

    /// Gets the HTTP port the dashboard listens on (default 8010)
    pub fn get_http_port(&self) -> u16 {
        self.get_port(&["host", "http_port"], DEFAULT_HTTP_PORT)
    }

    /// Gets the TCP port of the MPD daemon (default 6600)
    pub fn get_mpd_port(&self) -> u16 {
        self.get_port(&["mpd", "port"], DEFAULT_MPD_PORT)
    }

    impl_string_config!(
        get_mpd_host,
        &["mpd", "host"],
        DEFAULT_MPD_HOST
    );

    impl_usize_config!(
        get_mpd_timeout_secs,
        &["mpd", "timeout_secs"],
        DEFAULT_MPD_TIMEOUT_SECS
    );

    /// Timeout applied to daemon connection attempts and command round-trips
    pub fn get_mpd_timeout(&self) -> Duration {
        Duration::from_secs(self.get_mpd_timeout_secs().max(1) as u64)
    }

    impl_string_config!(
        get_listen_address,
        &["host", "listen_address"],
        DEFAULT_LISTEN_ADDRESS
    );

    /// Gets the URL path prefix the dashboard is mounted under.
    ///
    /// The value is normalized: a leading `/` is added, trailing ones are removed, and
    /// a root mount (`/` or empty) yields the empty string.
    pub fn get_path_prefix(&self) -> String {
        let raw = match self.get_value(&["host", "path_prefix"]) {
            Ok(Value::String(s)) => s,
            Ok(Value::Null) => String::new(),
            _ => DEFAULT_PATH_PREFIX.to_string(),
        };
        normalize_prefix(&raw)
    }

    /// Base URL under which raw music files are reachable, if configured
    pub fn get_files_url(&self) -> Option<String> {
        match self.get_value(&["host", "files_url"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => {
                Some(s.trim().trim_end_matches('/').to_string())
            }
            _ => None,
        }
    }

    impl_string_config!(
        get_log_min_level,
        &["host", "logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );

    impl_bool_config!(
        get_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );
}

/// Returns the global configuration instance
///
/// The configuration is loaded lazily on first access.
///
/// # Panics
///
/// Panics if the configuration directory cannot be created or the YAML is invalid.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external` replace the
/// default ones.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(), // scalars and sequences are replaced
    }
}
