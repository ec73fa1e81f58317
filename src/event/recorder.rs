//! Records host events through an [`EventStore`].

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use opentelemetry::KeyValue;
use tracing::debug;

use super::{Event, EventData, HostEvent, NewEvent};
use crate::error::Result;
use crate::model::HostStatus;
use crate::store::EventStore;
use crate::telemetry::metrics;

/// Appends audit events and reads them back in order.
///
/// Timestamps come from a process-wide monotonic clock with microsecond
/// resolution: every stamp is strictly later than the previous one, so
/// events recorded faster than the wall clock ticks still sort in the order
/// they were recorded. Across processes the store's sequence number breaks
/// any remaining ties.
#[derive(Clone)]
pub struct EventLog {
    store: Arc<dyn EventStore>,
}

/// Last timestamp handed out by any [`EventLog`] in this process.
static LAST_STAMP: Mutex<Option<DateTime<Utc>>> = Mutex::new(None);

impl EventLog {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Append an event for `resource_id` stamped with the current time.
    pub async fn record(&self, resource_id: &str, data: impl Into<EventData>) -> Result<Event> {
        let data = data.into();
        let event_type = data.event_type();
        let event = self
            .store
            .insert_event(NewEvent {
                resource_id: resource_id.to_string(),
                timestamp: self.next_stamp(),
                data,
            })
            .await?;

        metrics::events_recorded().add(1, &[KeyValue::new("event_type", event_type.as_str())]);
        debug!(resource_id, %event_type, seq = event.seq, "event recorded");
        Ok(event)
    }

    /// Every event for `resource_id`, oldest first.
    pub async fn find_in_order(&self, resource_id: &str) -> Result<Vec<Event>> {
        self.store.find_events(resource_id).await
    }

    fn next_stamp(&self) -> DateTime<Utc> {
        let now = truncate_to_micros(Utc::now());
        let mut last = LAST_STAMP.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = match *last {
            Some(prev) if now <= prev => prev + TimeDelta::microseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    pub async fn log_host_created(&self, host_id: &str) -> Result<Event> {
        self.record(host_id, HostEvent::Created).await
    }

    pub async fn log_host_status_changed(
        &self,
        host_id: &str,
        old_status: HostStatus,
        new_status: HostStatus,
    ) -> Result<Event> {
        self.record(
            host_id,
            HostEvent::StatusChanged {
                old_status,
                new_status,
            },
        )
        .await
    }

    pub async fn log_host_dns_name_set(&self, host_id: &str, hostname: &str) -> Result<Event> {
        self.record(
            host_id,
            HostEvent::DnsNameSet {
                hostname: hostname.to_string(),
            },
        )
        .await
    }

    pub async fn log_host_provisioned(&self, host_id: &str) -> Result<Event> {
        self.record(host_id, HostEvent::Provisioned).await
    }

    pub async fn log_host_provision_failed(&self, host_id: &str, setup_log: &str) -> Result<Event> {
        self.record(
            host_id,
            HostEvent::ProvisionFailed {
                setup_log: setup_log.to_string(),
            },
        )
        .await
    }

    pub async fn log_host_running_task_set(&self, host_id: &str, task_id: &str) -> Result<Event> {
        self.record(
            host_id,
            HostEvent::RunningTaskSet {
                task_id: task_id.to_string(),
            },
        )
        .await
    }

    pub async fn log_host_running_task_cleared(
        &self,
        host_id: &str,
        task_id: &str,
    ) -> Result<Event> {
        self.record(
            host_id,
            HostEvent::RunningTaskCleared {
                task_id: task_id.to_string(),
            },
        )
        .await
    }

    pub async fn log_host_task_pid_set(&self, host_id: &str, task_pid: &str) -> Result<Event> {
        self.record(
            host_id,
            HostEvent::TaskPidSet {
                task_pid: task_pid.to_string(),
            },
        )
        .await
    }

    pub async fn log_host_reachability_failed(&self, host_id: &str) -> Result<Event> {
        self.record(host_id, HostEvent::ReachabilityFailed).await
    }
}

/// Postgres keeps microseconds; stamps must survive a round trip unchanged.
fn truncate_to_micros(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(t.timestamp_micros()).unwrap_or(t)
}
