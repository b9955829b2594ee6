//! Handles settings for the application. Configuration is read from
//! `settings.toml` (or the file named by `RENTBOT_SETTINGS`) and from
//! `RENTBOT_*` environment variables, which take precedence.
//!
//! See `settings.example.toml` for every key.

use std::time::Duration;

use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use engine::{RentalPolicy, WaitPolicy};
use mailbox::MailboxSettings;
use serde::Deserialize;

const SETTINGS_PATH_VAR: &str = "RENTBOT_SETTINGS";
const DEFAULT_SETTINGS_PATH: &str = "settings";

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    #[default]
    Memory,
    Sqlite(String),
    /// Full sqlx connection url.
    Url(String),
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
            Database::Url(url) => url.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Telegram {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Admins {
    #[serde(default)]
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Rental {
    pub durations: Vec<u32>,
    pub code_attempts: u32,
    pub code_interval_secs: u64,
    pub code_lookback_minutes: u32,
}

impl Default for Rental {
    fn default() -> Self {
        let policy = RentalPolicy::default();
        Self {
            durations: policy.durations,
            code_attempts: policy.wait.attempts,
            code_interval_secs: policy.wait.interval.as_secs(),
            code_lookback_minutes: u32::try_from(policy.wait.lookback.num_minutes()).unwrap_or(0),
        }
    }
}

impl Rental {
    pub fn policy(&self) -> RentalPolicy {
        RentalPolicy {
            durations: self.durations.clone(),
            wait: WaitPolicy {
                attempts: self.code_attempts,
                interval: Duration::from_secs(self.code_interval_secs),
                lookback: chrono::Duration::minutes(i64::from(self.code_lookback_minutes)),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sweeper {
    pub interval_secs: u64,
}

impl Default for Sweeper {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Mailbox {
    pub host: String,
    pub port: u16,
    pub subject_filter: String,
    pub timeout_secs: u64,
}

impl Default for Mailbox {
    fn default() -> Self {
        let defaults = MailboxSettings::default();
        Self {
            host: defaults.host,
            port: defaults.port,
            subject_filter: defaults.subject_filter,
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

impl Mailbox {
    pub fn settings(&self) -> MailboxSettings {
        MailboxSettings {
            host: self.host.clone(),
            port: self.port,
            subject_filter: self.subject_filter.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Server {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

/// Hosting platforms announce the port through `PORT`.
fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(8000)
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub database: Database,
    pub telegram: Option<Telegram>,
    #[serde(default)]
    pub admins: Admins,
    #[serde(default)]
    pub rental: Rental,
    #[serde(default)]
    pub sweeper: Sweeper,
    #[serde(default)]
    pub mailbox: Mailbox,
    pub server: Option<Server>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let path = std::env::var(SETTINGS_PATH_VAR)
            .unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
        let builder = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(
                Environment::with_prefix("RENTBOT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("admins.ids")
                    .with_list_parse_key("rental.durations")
                    .try_parsing(true),
            );
        Self::load(builder)
    }

    fn load(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }

    #[cfg(test)]
    fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let source = File::from_str(toml, config::FileFormat::Toml);
        Self::load(Config::builder().add_source(source))
    }
}
