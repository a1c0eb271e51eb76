//! JSON-backed server configuration and console settings.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_IP: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 10008;
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// listen address; host names resolving to several addresses listen on each
    pub ip: String,
    pub port: u16,
    /// `None` logs to stdout
    pub logfile: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT,
            logfile: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        read_json(path)
    }

    /// Layer command-line values over this config.
    pub fn with_overrides(
        mut self,
        ip: Option<String>,
        port: Option<u16>,
        logfile: Option<PathBuf>,
    ) -> Self {
        if let Some(ip) = ip {
            self.ip = ip;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(logfile) = logfile {
            self.logfile = Some(logfile);
        }
        // an empty path means stdout
        if self
            .logfile
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.logfile = None;
        }
        self
    }
}

/// What the interactive console keeps between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    pub history_capacity: usize,
    /// committed commands, oldest first
    pub history: Vec<String>,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history: Vec::new(),
        }
    }
}

impl ConsoleSettings {
    /// Missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `$XDG_CONFIG_HOME/script-server/console.json`, falling back to `~/.config`.
    pub fn default_path() -> PathBuf {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("script-server").join("console.json")
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
