//! Relay configuration.
//!
//! Settings come from a key/value `.env` file or a JSON file (picked by
//! extension), with process environment variables of the same name taking
//! precedence. Required: `DISCORD_APPLICATION_ID`, `STATE_FILE_PATH`.

use crate::error::{ConfigError, ConfigResult};
use fs_err as fs;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const KEY_APPLICATION_ID: &str = "DISCORD_APPLICATION_ID";
pub const KEY_STATE_FILE: &str = "STATE_FILE_PATH";
pub const KEY_POLL_INTERVAL: &str = "POLL_INTERVAL_MS";
pub const KEY_DEBUG: &str = "DEBUG_MODE";

pub const DEFAULT_CONFIG_FILE: &str = ".env";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const MIN_POLL_INTERVAL_MS: u64 = 50;

const ROOT_MARKERS: &[&str] = &[".env", ".git", "Cargo.toml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    KeyValue,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        if name.ends_with(".json") {
            Some(ConfigFormat::Json)
        } else if name.contains(".env") {
            Some(ConfigFormat::KeyValue)
        } else {
            None
        }
    }
}

/// Flat string settings, as read from a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn parse(format: ConfigFormat, text: &str) -> Result<Self, String> {
        match format {
            ConfigFormat::KeyValue => Ok(parse_key_values(text)),
            ConfigFormat::Json => parse_json(text),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_key_values(text: &str) -> Settings {
    let mut settings = Settings::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        settings.insert(key, strip_quotes(value.trim()));
    }
    settings
}

fn parse_json(text: &str) -> Result<Settings, String> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|err| format!("invalid JSON: {}", err))?;
    let object = value
        .as_object()
        .ok_or_else(|| "top-level value must be an object".to_string())?;

    let mut settings = Settings::default();
    for (key, value) in object {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => continue,
            other => return Err(format!("{} must be a scalar, got {}", key, other)),
        };
        settings.insert(key.clone(), text);
    }
    Ok(settings)
}

pub fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayConfig {
    pub application_id: String,
    pub status_file: PathBuf,
    pub poll_interval_ms: u64,
    pub debug: bool,
    /// File the settings were read from, if any.
    pub source: Option<PathBuf>,
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Resolves the typed config. `env` is consulted first for every key.
    pub fn from_settings<F>(settings: &Settings, env: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| -> Option<String> {
            env(key)
                .or_else(|| settings.get(key).map(str::to_string))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let application_id =
            lookup(KEY_APPLICATION_ID).ok_or(ConfigError::MissingKey(KEY_APPLICATION_ID))?;
        if !application_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue {
                key: KEY_APPLICATION_ID,
                value: application_id,
                reason: "must be a numeric Discord application id".to_string(),
            });
        }

        let status_file = lookup(KEY_STATE_FILE)
            .map(|raw| expand_home(&raw))
            .ok_or(ConfigError::MissingKey(KEY_STATE_FILE))?;

        let poll_interval_ms = match lookup(KEY_POLL_INTERVAL) {
            Some(raw) => {
                let parsed: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: KEY_POLL_INTERVAL,
                    value: raw.clone(),
                    reason: "must be a whole number of milliseconds".to_string(),
                })?;
                parsed.max(MIN_POLL_INTERVAL_MS)
            }
            None => DEFAULT_POLL_INTERVAL_MS,
        };

        let debug = lookup(KEY_DEBUG).map(|v| parse_bool(&v)).unwrap_or(false);

        Ok(Self {
            application_id,
            status_file,
            poll_interval_ms,
            debug,
            source: None,
        })
    }
}

/// Expands a leading `~/` to the home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(raw),
        },
        None => PathBuf::from(raw),
    }
}

/// Walks up from `start` to the first directory holding a root marker.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()))
        .map(Path::to_path_buf)
}

/// Finds the default `.env`: the working directory first, then the project root.
pub fn find_config_file(cwd: &Path) -> Option<PathBuf> {
    let direct = cwd.join(DEFAULT_CONFIG_FILE);
    if direct.is_file() {
        return Some(direct);
    }
    find_project_root(cwd)
        .map(|root| root.join(DEFAULT_CONFIG_FILE))
        .filter(|path| path.is_file())
}

pub fn read_settings(path: &Path) -> ConfigResult<Settings> {
    let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::Malformed {
        path: path.to_path_buf(),
        details: "unsupported file type (expected .env or .json)".to_string(),
    })?;
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Settings::parse(format, &text).map_err(|details| ConfigError::Malformed {
        path: path.to_path_buf(),
        details,
    })
}

/// Loads the relay config.
///
/// An explicit path must exist. Without one, a missing `.env` is fine as
/// long as the environment supplies the required keys.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> ConfigResult<RelayConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            Some(path.to_path_buf())
        }
        None => find_config_file(cwd),
    };

    let settings = match &path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading relay configuration");
            read_settings(path)?
        }
        None => {
            tracing::debug!("No configuration file found; using environment only");
            Settings::default()
        }
    };

    let mut config = RelayConfig::from_settings(&settings, |key| std::env::var(key).ok())?;
    // Relative status paths are relative to the file that named them.
    if config.status_file.is_relative() {
        if let Some(dir) = path.as_deref().and_then(Path::parent) {
            config.status_file = dir.join(&config.status_file);
        }
    }
    config.source = path;
    Ok(config)
}
