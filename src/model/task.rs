//! Build tasks as seen by the monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A build task dispatched to a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub display_name: String,
    /// Identifier of the owning project.
    pub project: String,
    /// Host the task was dispatched to, if any.
    pub host_id: Option<String>,
    pub status: TaskStatus,
    /// Zero-based attempt number.
    pub execution: u32,
    pub dispatch_time: Option<DateTime<Utc>>,
    pub last_heartbeat: DateTime<Utc>,
    /// Why the task ended, when the monitor ended it.
    pub details: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, project: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            project: project.into(),
            host_id: None,
            status: TaskStatus::Undispatched,
            execution: 0,
            dispatch_time: None,
            last_heartbeat: Utc::now(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Undispatched,
    Dispatched,
    Started,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Undispatched, Dispatched)
                | (Dispatched, Started)
                | (Dispatched, Failed)
                | (Dispatched, Undispatched) // reset for retry
                | (Started, Succeeded)
                | (Started, Failed)
                | (Started, Undispatched)
        )
    }

    /// Assigned to a host and expected to heartbeat.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskStatus::Dispatched | TaskStatus::Started)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Undispatched => "undispatched",
            TaskStatus::Dispatched => "dispatched",
            TaskStatus::Started => "started",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "undispatched" => Ok(TaskStatus::Undispatched),
            "dispatched" => Ok(TaskStatus::Dispatched),
            "started" => Ok(TaskStatus::Started),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(Error::Other(format!("unknown task status: {s}"))),
        }
    }
}
