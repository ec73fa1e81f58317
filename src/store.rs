//! Data store interface.
//!
//! The monitor never talks to a database directly. It reads and writes
//! fleet state through [`FleetStore`] and appends audit events through
//! [`EventStore`]. [`crate::db::Db`] implements both against Postgres;
//! [`MemoryStore`] implements both in process.

pub mod memory;

pub use memory::{Fault, MemoryStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::event::{Event, NewEvent};
use crate::model::{Distro, Host, HostStatus, Project, ProjectRef, Task, TaskStatus};

/// Which hosts to fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostFilter {
    /// Only hosts in one of these statuses. Empty means any status.
    pub statuses: Vec<HostStatus>,
    pub distro_id: Option<String>,
}

impl HostFilter {
    /// Every host that has not been terminated.
    pub fn live() -> Self {
        Self {
            statuses: vec![
                HostStatus::Unprovisioned,
                HostStatus::Provisioning,
                HostStatus::Running,
                HostStatus::Decommissioned,
                HostStatus::ProvisionFailed,
            ],
            distro_id: None,
        }
    }

    pub fn status(status: HostStatus) -> Self {
        Self {
            statuses: vec![status],
            distro_id: None,
        }
    }

    pub fn matches(&self, host: &Host) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&host.status))
            && self
                .distro_id
                .as_ref()
                .is_none_or(|distro| *distro == host.distro_id)
    }
}

/// Which tasks to fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    /// Only tasks in one of these statuses. Empty means any status.
    pub statuses: Vec<TaskStatus>,
    pub project: Option<String>,
}

impl TaskFilter {
    /// Tasks that are assigned to a host and expected to heartbeat.
    pub fn in_flight() -> Self {
        Self {
            statuses: vec![TaskStatus::Dispatched, TaskStatus::Started],
            project: None,
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&task.status))
            && self
                .project
                .as_ref()
                .is_none_or(|project| *project == task.project)
    }
}

/// Hosts, tasks, distros, and projects.
///
/// Writes use optimistic concurrency: a transition names the status it
/// expects to move from and fails with `InvalidTransition` if the stored
/// status differs.
#[async_trait]
pub trait FleetStore: Send + Sync {
    async fn find_distros(&self) -> Result<Vec<Distro>>;

    async fn find_project_refs(&self) -> Result<Vec<ProjectRef>>;

    /// Resolve a project. `Ok(None)` when the ref points at nothing.
    async fn find_project(&self, project_ref: &ProjectRef) -> Result<Option<Project>>;

    async fn find_hosts(&self, filter: &HostFilter) -> Result<Vec<Host>>;

    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Move a host from `from` to `to`. Returns the updated host.
    async fn transition_host(&self, host_id: &str, from: HostStatus, to: HostStatus)
    -> Result<Host>;

    /// Clear the host's running task if it still points at `task_id`.
    /// Returns whether anything changed.
    async fn clear_running_task(&self, host_id: &str, task_id: &str) -> Result<bool>;

    async fn set_reachability_checked(&self, host_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn mark_notification_sent(&self, host_id: &str, key: &str) -> Result<()>;

    /// Move a task from `from` to `Failed`, recording why.
    async fn fail_task(&self, task_id: &str, from: TaskStatus, details: &str) -> Result<Task>;

    /// Move a task from `from` back to `Undispatched` with the next execution
    /// number and no host.
    async fn reset_task(&self, task_id: &str, from: TaskStatus) -> Result<Task>;
}

/// Append-only audit event storage.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event, assigning its sequence number.
    async fn insert_event(&self, event: NewEvent) -> Result<Event>;

    /// All events for a resource, ascending by timestamp then sequence.
    async fn find_events(&self, resource_id: &str) -> Result<Vec<Event>>;

    /// Remove every event. Administrative use only.
    async fn clear_events(&self) -> Result<u64>;
}
