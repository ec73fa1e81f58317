//! Integration tests for the host event audit log.

use std::sync::Arc;

use fleet_monitor::event::{EventLog, EventType, HostEvent, ResourceType};
use fleet_monitor::model::HostStatus;
use fleet_monitor::store::{EventStore, Fault, MemoryStore};

fn log() -> (Arc<MemoryStore>, EventLog) {
    let store = Arc::new(MemoryStore::new());
    (store.clone(), EventLog::new(store))
}

#[tokio::test]
async fn events_come_back_in_the_order_they_were_logged() {
    let (_store, events) = log();

    events.log_host_created("host_id").await.unwrap();
    events
        .log_host_status_changed("host_id", HostStatus::Unprovisioned, HostStatus::Provisioning)
        .await
        .unwrap();
    events
        .log_host_dns_name_set("host_id", "host_id.example.com")
        .await
        .unwrap();
    events.log_host_provisioned("host_id").await.unwrap();
    events
        .log_host_running_task_set("host_id", "task_1")
        .await
        .unwrap();
    events
        .log_host_running_task_cleared("host_id", "task_1")
        .await
        .unwrap();
    events.log_host_task_pid_set("host_id", "4242").await.unwrap();

    let found = events.find_in_order("host_id").await.unwrap();
    let kinds: Vec<EventType> = found.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        kinds,
        vec![
            EventType::HostCreated,
            EventType::HostStatusChanged,
            EventType::HostDnsNameSet,
            EventType::HostProvisioned,
            EventType::HostRunningTaskSet,
            EventType::HostRunningTaskCleared,
            EventType::HostTaskPidSet,
        ]
    );
    assert!(found.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert!(found.iter().all(|e| e.resource_type() == ResourceType::Host));
}

#[tokio::test]
async fn events_for_other_hosts_are_not_returned() {
    let (_store, events) = log();

    events.log_host_created("a").await.unwrap();
    events.log_host_created("b").await.unwrap();
    events.log_host_provisioned("a").await.unwrap();

    let found = events.find_in_order("a").await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|e| e.resource_id == "a"));
    assert!(events.find_in_order("nobody").await.unwrap().is_empty());
}

/// Every accessor of a host payload, in a comparable shape.
type Fields<'a> = (
    Option<HostStatus>,
    Option<HostStatus>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
);

fn fields(event: &HostEvent) -> Fields<'_> {
    (
        event.old_status(),
        event.new_status(),
        event.hostname(),
        event.task_id(),
        event.task_pid(),
        event.setup_log(),
    )
}

#[tokio::test]
async fn payloads_carry_only_their_own_fields() {
    let (_store, events) = log();

    events.log_host_created("h").await.unwrap();
    events
        .log_host_status_changed("h", HostStatus::Running, HostStatus::Terminated)
        .await
        .unwrap();
    events.log_host_dns_name_set("h", "h.example.com").await.unwrap();
    events.log_host_provisioned("h").await.unwrap();
    events
        .log_host_provision_failed("h", "cloud-init: exit 1")
        .await
        .unwrap();
    events.log_host_running_task_set("h", "t1").await.unwrap();
    events.log_host_running_task_cleared("h", "t1").await.unwrap();
    events.log_host_task_pid_set("h", "99").await.unwrap();
    events.log_host_reachability_failed("h").await.unwrap();

    let found = events.find_in_order("h").await.unwrap();
    let expected: Vec<(EventType, Fields<'_>)> = vec![
        (EventType::HostCreated, (None, None, None, None, None, None)),
        (
            EventType::HostStatusChanged,
            (
                Some(HostStatus::Running),
                Some(HostStatus::Terminated),
                None,
                None,
                None,
                None,
            ),
        ),
        (
            EventType::HostDnsNameSet,
            (None, None, Some("h.example.com"), None, None, None),
        ),
        (EventType::HostProvisioned, (None, None, None, None, None, None)),
        (
            EventType::HostProvisionFailed,
            (None, None, None, None, None, Some("cloud-init: exit 1")),
        ),
        (
            EventType::HostRunningTaskSet,
            (None, None, None, Some("t1"), None, None),
        ),
        (
            EventType::HostRunningTaskCleared,
            (None, None, None, Some("t1"), None, None),
        ),
        (
            EventType::HostTaskPidSet,
            (None, None, None, None, Some("99"), None),
        ),
        (
            EventType::HostReachabilityFailed,
            (None, None, None, None, None, None),
        ),
    ];

    assert_eq!(found.len(), expected.len());
    for (event, (kind, want)) in found.iter().zip(expected) {
        assert_eq!(event.event_type(), kind);
        assert_eq!(fields(event.host().unwrap()), want, "{kind:?}");
    }
}

#[tokio::test]
async fn reads_reflect_later_writes() {
    let (_store, events) = log();

    events.log_host_created("h").await.unwrap();
    assert_eq!(events.find_in_order("h").await.unwrap().len(), 1);

    events.log_host_reachability_failed("h").await.unwrap();
    let found = events.find_in_order("h").await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[1].event_type(), EventType::HostReachabilityFailed);
}

#[tokio::test]
async fn storage_failure_is_returned_to_the_caller() {
    let (store, events) = log();
    store.inject_fault(Fault::InsertEvent);

    assert!(events.log_host_created("h").await.is_err());
    store.clear_faults();
    assert!(events.find_in_order("h").await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_events_empties_the_log() {
    let (store, events) = log();
    events.log_host_created("h").await.unwrap();
    events.log_host_provisioned("h").await.unwrap();

    assert_eq!(store.clear_events().await.unwrap(), 2);
    assert!(events.find_in_order("h").await.unwrap().is_empty());
}
