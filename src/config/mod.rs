//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.
//! Monitoring thresholds live in a separate TOML file, see [`settings`].

pub mod settings;

pub use settings::MonitorSettings;

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    /// Hook invoked to terminate or decommission a host.
    pub provision_command: PathBuf,
    /// Hook invoked to deliver a notification.
    pub notify_command: PathBuf,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// TOML file with [`MonitorSettings`]. Defaults apply when unset.
    pub settings_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// Under cron or systemd, the unit's environment provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            provision_command: PathBuf::from(required_var("PROVISION_COMMAND")?),
            notify_command: PathBuf::from(required_var("NOTIFY_COMMAND")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            settings_path: std::env::var("FLEET_SETTINGS").ok().map(PathBuf::from),
        })
    }

    /// Monitoring settings from `settings_path`, or the defaults.
    pub fn monitor_settings(&self) -> Result<MonitorSettings> {
        match &self.settings_path {
            Some(path) => MonitorSettings::load(path),
            None => Ok(MonitorSettings::default()),
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
