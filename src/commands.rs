use std::error::Error;

use clap::{Args, Parser, Subcommand};
use inquire::Password;

mod configure;
mod query;
mod shell;

pub use crate::commands::configure::configure;
pub use crate::commands::query::query;

use crate::{
    config::{Config, ConnectionSettings, ProgressMode, Protocol},
    parsers::{Parser as _, SettingParser},
    query::Settings,
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write or update the configuration file
    Configure(ConfigureArgs),
}

#[derive(Parser, Debug, Default)]
pub struct ConfigureArgs {
    /// Get the config file path
    #[arg(long)]
    pub get_path: bool,

    /// Start from the existing config file instead of the defaults
    #[arg(long)]
    pub update: bool,
}

#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    /// Server host name
    #[arg(short = 'h', long)]
    pub host: Option<String>,

    /// Server port (8123 for http, 8443 for https unless configured)
    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long, value_enum)]
    pub protocol: Option<Protocol>,

    #[arg(short, long)]
    pub user: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    /// Prompt for the password
    #[arg(long, conflicts_with = "password")]
    pub ask_password: bool,

    /// Run a single query and exit; piped stdin is sent after it
    #[arg(short, long)]
    pub query: Option<String>,

    #[arg(short, long)]
    pub database: Option<String>,

    /// Pager command for interactive results, e.g. --pager="less -S -R"
    #[arg(long)]
    pub pager: Option<String>,

    /// Output format, e.g. -f=JSONEachRow
    #[arg(short, long)]
    pub format: Option<String>,

    /// Use the Vertical format unless --format is given
    #[arg(short = 'E', long)]
    pub vertical: bool,

    /// Print the elapsed time to stderr after the query
    #[arg(short, long)]
    pub time: bool,

    /// Ask the server for stack traces in error messages
    #[arg(long)]
    pub stacktrace: bool,

    /// Show live progress on stderr
    #[arg(long)]
    pub progress: bool,

    #[arg(long, value_enum)]
    pub progress_mode: Option<ProgressMode>,

    /// Print the query to stderr before running it
    #[arg(long)]
    pub echo: bool,

    /// Print server-side statistics from the query log afterwards
    #[arg(long)]
    pub stats: bool,

    /// Extra setting sent with every query, e.g. --setting max_threads=4
    #[arg(long = "setting", value_parser = |s: &str| SettingParser::from_str(s))]
    pub settings: Vec<(String, String)>,

    /// Log requests and internals to stderr
    #[arg(long)]
    pub debug: bool,
}

impl QueryArgs {
    /// Command line values take precedence over the config file.
    pub fn connection(&self, config: &Config) -> Result<ConnectionSettings, Box<dyn Error>> {
        let protocol = self.protocol.unwrap_or(config.protocol);

        let password = if self.ask_password {
            Some(Password::new("Password:").without_confirmation().prompt()?)
        } else {
            self.password.clone().or_else(|| config.password.clone())
        };

        Ok(ConnectionSettings {
            protocol,
            host: self.host.clone().unwrap_or_else(|| config.host.clone()),
            port: self
                .port
                .or(config.port)
                .unwrap_or_else(|| protocol.default_port()),
            user: self.user.clone().unwrap_or_else(|| config.user.clone()),
            password,
            database: self
                .database
                .clone()
                .unwrap_or_else(|| config.database.clone()),
            stacktrace: self.stacktrace || config.stacktrace,
        })
    }

    pub fn settings(&self) -> Settings {
        self.settings.iter().cloned().collect()
    }

    pub fn progress_mode(&self, config: &Config) -> ProgressMode {
        self.progress_mode.unwrap_or(config.progress_mode)
    }

    /// `--format`, then `--vertical`, then the config file, then the
    /// mode's own default.
    pub fn format(&self, config: &Config, fallback: &str) -> String {
        if let Some(format) = &self.format {
            return format.clone();
        }
        if self.vertical {
            return crate::session::VERTICAL.to_string();
        }
        config
            .format
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}
