use std::fmt::{self, Display, Formatter};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

const APP_NAME: &str = "houseq";
const CONFIG_NAME: &str = "config";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn all() -> [Protocol; 2] {
        [Protocol::Http, Protocol::Https]
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Http => 8123,
            Protocol::Https => 8443,
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// How live progress reaches the client while a query runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProgressMode {
    /// Poll the server's process list every 125 ms.
    #[default]
    Poll,
    /// Read progress headers the server streams before the body.
    Headers,
    Off,
}

impl ProgressMode {
    pub fn all() -> [ProgressMode; 3] {
        [ProgressMode::Poll, ProgressMode::Headers, ProgressMode::Off]
    }
}

impl Display for ProgressMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ProgressMode::Poll => write!(f, "poll"),
            ProgressMode::Headers => write!(f, "headers"),
            ProgressMode::Off => write!(f, "off"),
        }
    }
}

/// Everything needed to reach the server, after merging the config file
/// with the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub stacktrace: bool,
}

impl ConnectionSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    FileNotFound,
    Unreadable(String),
    SaveFailed(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound => write!(f, "Could not locate the configuration file"),
            ConfigError::Unreadable(msg) => write!(
                f,
                "Could not read the configuration file ({}). Please use houseq configure",
                msg
            ),
            ConfigError::SaveFailed(msg) => write!(f, "Failed to save configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: Option<u16>,
    pub protocol: Protocol,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub format: Option<String>,
    pub pager: Option<String>,
    pub progress_mode: ProgressMode,
    pub stacktrace: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_string(),
            port: None,
            protocol: Protocol::Http,
            user: "default".to_string(),
            password: None,
            database: "default".to_string(),
            format: None,
            pager: None,
            progress_mode: ProgressMode::Poll,
            stacktrace: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        confy::load::<Config>(APP_NAME, CONFIG_NAME)
            .map_err(|e| ConfigError::Unreadable(e.to_string()))
    }

    /// Loads the file, falling back to defaults when it cannot be read.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            warn!("{}", e);
            Config::default()
        })
    }

    pub fn store(&self) -> Result<(), ConfigError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
            .map_err(|e| ConfigError::SaveFailed(e.to_string()))
    }

    pub fn file_path() -> Result<String, ConfigError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
            .map(|s| s.display().to_string())
            .map_err(|_| ConfigError::FileNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_the_config_file() {
        for mode in ProgressMode::all() {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode));
        }
        for protocol in Protocol::all() {
            let json = serde_json::to_string(&protocol).unwrap();
            assert_eq!(json, format!("\"{}\"", protocol));
        }
        assert!(serde_json::from_str::<Protocol>("\"carrier-pigeon\"").is_err());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"host":"ch.internal","progress_mode":"headers"}"#).unwrap();

        assert_eq!(config.host, "ch.internal");
        assert_eq!(config.progress_mode, ProgressMode::Headers);
        assert_eq!(config.user, "default");
        assert_eq!(config.database, "default");
    }
}
