//! Host lifecycle audit events.
//!
//! Every host state change the monitor (or anything else) makes is recorded
//! as an immutable [`Event`]. Events are appended, never updated, and read
//! back per resource in the order they happened. The payload is a tagged
//! union: each [`HostEvent`] variant carries only the fields that matter for
//! that transition, and the accessors report every other field as blank.

mod recorder;

pub use recorder::EventLog;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::HostStatus;

/// A recorded audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Insertion sequence assigned by the store. Breaks timestamp ties.
    pub seq: i64,
    /// Id of the subject, e.g. a host id.
    pub resource_id: String,
    /// When the transition was recorded.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub data: EventData,
}

impl Event {
    pub fn resource_type(&self) -> ResourceType {
        self.data.resource_type()
    }

    pub fn event_type(&self) -> EventType {
        self.data.event_type()
    }

    /// The host payload, if this is a host event.
    pub fn host(&self) -> Option<&HostEvent> {
        match &self.data {
            EventData::Host(event) => Some(event),
        }
    }
}

/// An event before the store has assigned it a sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub resource_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

/// Payload, keyed by the kind of resource it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource_type", content = "data")]
pub enum EventData {
    #[serde(rename = "HOST")]
    Host(HostEvent),
}

impl EventData {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            EventData::Host(_) => ResourceType::Host,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            EventData::Host(event) => event.event_type(),
        }
    }
}

impl From<HostEvent> for EventData {
    fn from(event: HostEvent) -> Self {
        EventData::Host(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Host,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Host => "HOST",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of transition an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    HostCreated,
    HostStatusChanged,
    HostDnsNameSet,
    HostProvisioned,
    HostProvisionFailed,
    HostRunningTaskSet,
    HostRunningTaskCleared,
    HostTaskPidSet,
    HostReachabilityFailed,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::HostCreated => "HOST_CREATED",
            EventType::HostStatusChanged => "HOST_STATUS_CHANGED",
            EventType::HostDnsNameSet => "HOST_DNS_NAME_SET",
            EventType::HostProvisioned => "HOST_PROVISIONED",
            EventType::HostProvisionFailed => "HOST_PROVISION_FAILED",
            EventType::HostRunningTaskSet => "HOST_RUNNING_TASK_SET",
            EventType::HostRunningTaskCleared => "HOST_RUNNING_TASK_CLEARED",
            EventType::HostTaskPidSet => "HOST_TASK_PID_SET",
            EventType::HostReachabilityFailed => "HOST_REACHABILITY_FAILED",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HOST_CREATED" => Ok(EventType::HostCreated),
            "HOST_STATUS_CHANGED" => Ok(EventType::HostStatusChanged),
            "HOST_DNS_NAME_SET" => Ok(EventType::HostDnsNameSet),
            "HOST_PROVISIONED" => Ok(EventType::HostProvisioned),
            "HOST_PROVISION_FAILED" => Ok(EventType::HostProvisionFailed),
            "HOST_RUNNING_TASK_SET" => Ok(EventType::HostRunningTaskSet),
            "HOST_RUNNING_TASK_CLEARED" => Ok(EventType::HostRunningTaskCleared),
            "HOST_TASK_PID_SET" => Ok(EventType::HostTaskPidSet),
            "HOST_REACHABILITY_FAILED" => Ok(EventType::HostReachabilityFailed),
            _ => Err(Error::Other(format!("unknown event type: {s}"))),
        }
    }
}

/// A host lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum HostEvent {
    #[serde(rename = "HOST_CREATED")]
    Created,
    #[serde(rename = "HOST_STATUS_CHANGED")]
    StatusChanged {
        old_status: HostStatus,
        new_status: HostStatus,
    },
    #[serde(rename = "HOST_DNS_NAME_SET")]
    DnsNameSet { hostname: String },
    #[serde(rename = "HOST_PROVISIONED")]
    Provisioned,
    #[serde(rename = "HOST_PROVISION_FAILED")]
    ProvisionFailed { setup_log: String },
    #[serde(rename = "HOST_RUNNING_TASK_SET")]
    RunningTaskSet { task_id: String },
    #[serde(rename = "HOST_RUNNING_TASK_CLEARED")]
    RunningTaskCleared { task_id: String },
    #[serde(rename = "HOST_TASK_PID_SET")]
    TaskPidSet { task_pid: String },
    #[serde(rename = "HOST_REACHABILITY_FAILED")]
    ReachabilityFailed,
}

impl HostEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            HostEvent::Created => EventType::HostCreated,
            HostEvent::StatusChanged { .. } => EventType::HostStatusChanged,
            HostEvent::DnsNameSet { .. } => EventType::HostDnsNameSet,
            HostEvent::Provisioned => EventType::HostProvisioned,
            HostEvent::ProvisionFailed { .. } => EventType::HostProvisionFailed,
            HostEvent::RunningTaskSet { .. } => EventType::HostRunningTaskSet,
            HostEvent::RunningTaskCleared { .. } => EventType::HostRunningTaskCleared,
            HostEvent::TaskPidSet { .. } => EventType::HostTaskPidSet,
            HostEvent::ReachabilityFailed => EventType::HostReachabilityFailed,
        }
    }

    pub fn old_status(&self) -> Option<HostStatus> {
        match self {
            HostEvent::StatusChanged { old_status, .. } => Some(*old_status),
            _ => None,
        }
    }

    pub fn new_status(&self) -> Option<HostStatus> {
        match self {
            HostEvent::StatusChanged { new_status, .. } => Some(*new_status),
            _ => None,
        }
    }

    pub fn hostname(&self) -> Option<&str> {
        match self {
            HostEvent::DnsNameSet { hostname } => Some(hostname),
            _ => None,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            HostEvent::RunningTaskSet { task_id } | HostEvent::RunningTaskCleared { task_id } => {
                Some(task_id)
            }
            _ => None,
        }
    }

    pub fn task_pid(&self) -> Option<&str> {
        match self {
            HostEvent::TaskPidSet { task_pid } => Some(task_pid),
            _ => None,
        }
    }

    pub fn setup_log(&self) -> Option<&str> {
        match self {
            HostEvent::ProvisionFailed { setup_log } => Some(setup_log),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_changed_exposes_only_statuses() {
        let event = HostEvent::StatusChanged {
            old_status: HostStatus::Running,
            new_status: HostStatus::Terminated,
        };
        assert_eq!(event.old_status(), Some(HostStatus::Running));
        assert_eq!(event.new_status(), Some(HostStatus::Terminated));
        assert!(event.hostname().is_none());
        assert!(event.task_id().is_none());
        assert!(event.task_pid().is_none());
        assert!(event.setup_log().is_none());
    }

    #[test]
    fn payload_json_carries_both_tags() {
        let data = EventData::from(HostEvent::DnsNameSet {
            hostname: "build-1.example.com".to_string(),
        });
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["resource_type"], "HOST");
        assert_eq!(json["data"]["event_type"], "HOST_DNS_NAME_SET");
        assert_eq!(json["data"]["hostname"], "build-1.example.com");

        let back: EventData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn unit_variants_serialize_as_bare_tags() {
        let json = serde_json::to_value(EventData::from(HostEvent::Created)).unwrap();
        assert_eq!(json["data"], serde_json::json!({"event_type": "HOST_CREATED"}));
    }

    #[test]
    fn event_type_strings_match_serde_tags() {
        for event in [
            HostEvent::Created,
            HostEvent::Provisioned,
            HostEvent::ReachabilityFailed,
            HostEvent::TaskPidSet {
                task_pid: "1".to_string(),
            },
        ] {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event_type"], event.event_type().as_str());
            let parsed: EventType = event.event_type().as_str().parse().unwrap();
            assert_eq!(parsed, event.event_type());
        }
    }
}
