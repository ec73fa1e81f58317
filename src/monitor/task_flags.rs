//! Task flagging functions.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::MonitorSettings;
use crate::error::Result;
use crate::model::Task;

/// Read-only view of in-flight tasks handed to task policies.
#[derive(Debug, Clone, Copy)]
pub struct TaskSnapshot<'a> {
    pub tasks: &'a [Task],
    pub settings: &'a MonitorSettings,
    pub now: DateTime<Utc>,
}

/// Selects tasks that need cleanup.
pub trait TaskFlagger: Send + Sync {
    fn name(&self) -> &'static str;

    fn flag(&self, snapshot: &TaskSnapshot<'_>) -> Result<Vec<Task>>;
}

pub fn defaults() -> Vec<Arc<dyn TaskFlagger>> {
    vec![Arc::new(TimedOutHeartbeats)]
}

/// Dispatched or started tasks that have not heartbeated within the timeout.
pub struct TimedOutHeartbeats;

impl TaskFlagger for TimedOutHeartbeats {
    fn name(&self) -> &'static str {
        "heartbeat_timeout"
    }

    fn flag(&self, snapshot: &TaskSnapshot<'_>) -> Result<Vec<Task>> {
        let deadline = snapshot.now - snapshot.settings.heartbeat_timeout();
        Ok(snapshot
            .tasks
            .iter()
            .filter(|t| t.status.is_in_flight() && t.last_heartbeat < deadline)
            .cloned()
            .collect())
    }
}
