//! Client configuration.
//!
//! Credentials live in an INI file, `~/.config/ruccola/config.ini` by
//! default:
//!
//! ```ini
//! [auth]
//! server = chat.example.com
//! user_id = aobEdbYhXfu5hkeqG
//! token = 9HqLlyZOugoStsXCUfD_0YdwnNnunAJF8V47U3QHXSq
//! ```
//!
//! `RUCCOLA_SERVER`, `RUCCOLA_USER_ID` and `RUCCOLA_TOKEN` override the
//! matching file values.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use thiserror::Error;
use tracing::debug;

const AUTH_SECTION: &str = "auth";
const CONFIG_RELATIVE_PATH: &str = ".config/ruccola/config.ini";

pub const SERVER_ENV: &str = "RUCCOLA_SERVER";
pub const USER_ID_ENV: &str = "RUCCOLA_USER_ID";
pub const TOKEN_ENV: &str = "RUCCOLA_TOKEN";

/// Server address and credentials shared by the REST and realtime clients.
#[derive(Clone)]
pub struct Config {
    /// Host name, optionally with scheme and port.
    pub server: String,
    pub user_id: String,
    pub token: SecretString,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("user_id", &self.user_id)
            .field("token", &"[redacted]")
            .finish()
    }
}

/// Values collected before the required-key check.
#[derive(Debug, Default)]
struct PartialConfig {
    server: Option<String>,
    user_id: Option<String>,
    token: Option<String>,
}

impl PartialConfig {
    fn from_auth_section(mut values: HashMap<String, String>) -> Self {
        Self {
            server: values.remove("server"),
            user_id: values.remove("user_id"),
            token: values.remove("token"),
        }
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(SERVER_ENV) {
            self.server = Some(value);
        }
        if let Some(value) = lookup(USER_ID_ENV) {
            self.user_id = Some(value);
        }
        if let Some(value) = lookup(TOKEN_ENV) {
            self.token = Some(value);
        }
    }

    fn finish(self) -> Result<Config, ConfigError> {
        let server = required(self.server, "server")?;
        let user_id = required(self.user_id, "user_id")?;
        let token = required(self.token, "token")?;
        Ok(Config {
            server,
            user_id,
            token: SecretString::new(token),
        })
    }
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingKey(key))
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_RELATIVE_PATH))
            .ok_or(ConfigError::NoHomeDir)
    }

    /// Loads the default file, then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Loads `path`, then applies environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut partial = read_file(path)?;
        partial.apply_env(env_lookup);
        partial.finish()
    }

    /// Like [`load_from`](Self::load_from), but a missing file is not an
    /// error as long as the environment supplies every key.
    pub fn from_env_or_file(path: &Path) -> Result<Self, ConfigError> {
        let mut partial = if path.exists() {
            read_file(path)?
        } else {
            debug!(event = "config_file_absent", path = %path.display());
            PartialConfig::default()
        };
        partial.apply_env(env_lookup);
        partial.finish()
    }

    /// Parses INI text without consulting the environment.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        PartialConfig::from_auth_section(parse_auth_section(text)?).finish()
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn read_file(path: &Path) -> Result<PartialConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(event = "config_file_loaded", path = %path.display());
    Ok(PartialConfig::from_auth_section(parse_auth_section(&text)?))
}

/// Returns the key/value pairs of the `[auth]` section.
fn parse_auth_section(text: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut section: Option<&str> = None;
    let mut seen_auth = false;
    let mut values = HashMap::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[') {
            let name = name
                .strip_suffix(']')
                .ok_or(ConfigError::Malformed { line: index + 1 })?
                .trim();
            seen_auth |= name == AUTH_SECTION;
            section = Some(name);
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .or_else(|| line.split_once(':'))
            .ok_or(ConfigError::Malformed { line: index + 1 })?;

        if section == Some(AUTH_SECTION) {
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    if !seen_auth {
        return Err(ConfigError::MissingSection(AUTH_SECTION));
    }
    Ok(values)
}

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config is missing the [{0}] section")]
    MissingSection(&'static str),

    #[error("config is missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("malformed config at line {line}")]
    Malformed { line: usize },
}
