//! Monitoring thresholds.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration.

use std::path::Path;

use chrono::Duration;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Running hosts idle longer than this are terminated.
    pub idle_cutoff_mins: i64,
    /// Hosts still starting after this long are terminated.
    pub provisioning_cutoff_mins: i64,
    /// Admins are warned about hosts starting for longer than this.
    pub slow_provisioning_mins: i64,
    /// In-flight tasks silent for longer than this are cleaned up.
    pub heartbeat_timeout_mins: i64,
    /// Minimum time between reachability probes of the same host.
    pub reachability_interval_mins: i64,
    /// Spawn host owners are warned this many hours before expiration.
    pub expiration_warning_hours: Vec<i64>,
    /// Attempts a task gets before a heartbeat timeout fails it for good.
    pub max_task_executions: u32,
    /// Cleanup actions run concurrently within one flagging function.
    pub max_concurrent_cleanups: usize,
    /// Limit on each provisioner or mailer hook invocation.
    pub command_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub probe_port: u16,
    /// Recipients of fleet-wide warnings.
    pub admin_recipients: Vec<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            idle_cutoff_mins: 15,
            provisioning_cutoff_mins: 35,
            slow_provisioning_mins: 20,
            heartbeat_timeout_mins: 7,
            reachability_interval_mins: 10,
            expiration_warning_hours: vec![12, 2],
            max_task_executions: 3,
            max_concurrent_cleanups: 8,
            command_timeout_secs: 60,
            probe_timeout_secs: 10,
            probe_port: 22,
            admin_recipients: Vec::new(),
        }
    }
}

impl MonitorSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad settings file {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_cleanups == 0 {
            return Err(Error::Config(
                "max_concurrent_cleanups must be at least 1".to_string(),
            ));
        }
        if self.expiration_warning_hours.iter().any(|h| *h <= 0) {
            return Err(Error::Config(
                "expiration_warning_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn idle_cutoff(&self) -> Duration {
        Duration::minutes(self.idle_cutoff_mins)
    }

    pub fn provisioning_cutoff(&self) -> Duration {
        Duration::minutes(self.provisioning_cutoff_mins)
    }

    pub fn slow_provisioning_threshold(&self) -> Duration {
        Duration::minutes(self.slow_provisioning_mins)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::minutes(self.heartbeat_timeout_mins)
    }

    pub fn reachability_interval(&self) -> Duration {
        Duration::minutes(self.reachability_interval_mins)
    }

    pub fn command_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.command_timeout_secs)
    }

    pub fn probe_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.probe_timeout_secs)
    }
}
