//! Hosts and their lifecycle status.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The user recorded as `started_by` for hosts the system provisioned itself.
pub const SYSTEM_USER: &str = "system";

/// A provisioned compute instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: String,

    /// DNS name. Empty until the provider reports one.
    pub host: String,

    pub distro_id: String,

    pub status: HostStatus,

    /// Who asked for the host. [`SYSTEM_USER`] unless this is a spawn host.
    pub started_by: String,

    /// Spawned on behalf of a user rather than for running tasks.
    pub user_host: bool,

    pub creation_time: DateTime<Utc>,

    /// Spawn hosts are terminated once this passes.
    pub expiration_time: Option<DateTime<Utc>>,

    /// Task currently assigned to this host.
    pub running_task: Option<String>,

    pub last_task_completed_time: Option<DateTime<Utc>>,

    pub last_reachability_check: Option<DateTime<Utc>>,

    /// Keys of warnings already delivered for this host.
    #[serde(default)]
    pub notifications: BTreeSet<String>,
}

impl Host {
    /// A fresh system host in `Unprovisioned`, created now.
    pub fn new(id: impl Into<String>, distro_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: String::new(),
            distro_id: distro_id.into(),
            status: HostStatus::Unprovisioned,
            started_by: SYSTEM_USER.to_string(),
            user_host: false,
            creation_time: Utc::now(),
            expiration_time: None,
            running_task: None,
            last_task_completed_time: None,
            last_reachability_check: None,
            notifications: BTreeSet::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.running_task.is_none()
    }

    /// How long the host has gone without a task, as of `now`.
    pub fn idle_time(&self, now: DateTime<Utc>) -> Duration {
        let since = self
            .last_task_completed_time
            .unwrap_or(self.creation_time);
        now - since
    }

    pub fn notification_sent(&self, key: &str) -> bool {
        self.notifications.contains(key)
    }
}

/// Lifecycle status of a host.
///
/// "Idle" and "running a task" are both `Running`; they differ only in
/// `running_task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    /// Created in the store, not yet handed to the provider.
    Unprovisioned,
    /// Instance exists, setup still running.
    Provisioning,
    /// Ready for tasks.
    Running,
    /// Draining: finishes its current task, then gets terminated.
    Decommissioned,
    /// Setup failed. Awaiting termination.
    ProvisionFailed,
    /// Gone. Terminal.
    Terminated,
}

impl HostStatus {
    pub fn can_transition_to(self, to: HostStatus) -> bool {
        use HostStatus::*;
        matches!(
            (self, to),
            (Unprovisioned, Provisioning)
                | (Provisioning, Running)
                | (Provisioning, ProvisionFailed)
                | (Unprovisioned, Decommissioned)
                | (Provisioning, Decommissioned)
                | (Running, Decommissioned)
        ) || (to == Terminated && self != Terminated)
    }

    pub fn is_terminal(self) -> bool {
        self == HostStatus::Terminated
    }

    /// Statuses a host can be in before it is ready for work.
    pub fn is_starting(self) -> bool {
        matches!(self, HostStatus::Unprovisioned | HostStatus::Provisioning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostStatus::Unprovisioned => "unprovisioned",
            HostStatus::Provisioning => "provisioning",
            HostStatus::Running => "running",
            HostStatus::Decommissioned => "decommissioned",
            HostStatus::ProvisionFailed => "provision_failed",
            HostStatus::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HostStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unprovisioned" => Ok(HostStatus::Unprovisioned),
            "provisioning" => Ok(HostStatus::Provisioning),
            "running" => Ok(HostStatus::Running),
            "decommissioned" => Ok(HostStatus::Decommissioned),
            "provision_failed" => Ok(HostStatus::ProvisionFailed),
            "terminated" => Ok(HostStatus::Terminated),
            _ => Err(Error::Other(format!("unknown host status: {s}"))),
        }
    }
}

/// What the host monitor does to a flagged host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostAction {
    /// Destroy the instance now.
    Terminate,
    /// Stop giving it work; a later pass terminates it once idle.
    Decommission,
}

impl HostAction {
    /// Status the host ends up in after the action.
    pub fn target_status(self) -> HostStatus {
        match self {
            HostAction::Terminate => HostStatus::Terminated,
            HostAction::Decommission => HostStatus::Decommissioned,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostAction::Terminate => "terminate",
            HostAction::Decommission => "decommission",
        }
    }
}

impl std::fmt::Display for HostAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminated_is_reachable_from_every_live_status() {
        for status in [
            HostStatus::Unprovisioned,
            HostStatus::Provisioning,
            HostStatus::Running,
            HostStatus::Decommissioned,
            HostStatus::ProvisionFailed,
        ] {
            assert!(status.can_transition_to(HostStatus::Terminated), "{status}");
        }
        assert!(!HostStatus::Terminated.can_transition_to(HostStatus::Terminated));
    }

    #[test]
    fn decommissioned_cannot_go_back_to_running() {
        assert!(!HostStatus::Decommissioned.can_transition_to(HostStatus::Running));
        assert!(!HostStatus::ProvisionFailed.can_transition_to(HostStatus::Decommissioned));
    }

    #[test]
    fn status_round_trips_through_str() {
        let parsed: HostStatus = HostStatus::ProvisionFailed.to_string().parse().unwrap();
        assert_eq!(parsed, HostStatus::ProvisionFailed);
        assert!("bogus".parse::<HostStatus>().is_err());
    }

    #[test]
    fn idle_time_falls_back_to_creation_time() {
        let now = Utc::now();
        let mut host = Host::new("h1", "d1");
        host.creation_time = now - Duration::minutes(30);
        assert_eq!(host.idle_time(now), Duration::minutes(30));

        host.last_task_completed_time = Some(now - Duration::minutes(5));
        assert_eq!(host.idle_time(now), Duration::minutes(5));
    }
}
