//! Integration tests for host cleanup and host checks.

mod common;

use chrono::{Duration, Utc};
use common::{TestFleet, running_host};
use fleet_monitor::config::MonitorSettings;
use fleet_monitor::error::Error;
use fleet_monitor::event::EventType;
use fleet_monitor::model::{Distro, Host, HostAction, HostStatus, STATIC_PROVIDER};
use fleet_monitor::monitor::{HostMonitor, checks, host_flags};
use fleet_monitor::store::{FleetStore, HostFilter};

fn monitor(fleet: &TestFleet) -> HostMonitor {
    HostMonitor::new(
        fleet.services.clone(),
        host_flags::defaults(),
        checks::defaults(),
    )
}

#[tokio::test]
async fn idle_host_is_terminated_with_an_audit_trail() {
    let fleet = TestFleet::new();
    let distros = vec![Distro::new("ubuntu", "ec2", 10)];
    fleet.store.insert_host(running_host("idle", "ubuntu", 60));
    fleet.store.insert_host(running_host("fresh", "ubuntu", 2));

    let errors = monitor(&fleet)
        .cleanup_hosts(&distros, &MonitorSettings::default())
        .await;
    assert!(errors.is_empty(), "{errors:?}");

    assert_eq!(
        fleet.provisioner.calls(),
        vec![("idle".to_string(), HostAction::Terminate)]
    );
    assert_eq!(fleet.store.host("idle").unwrap().status, HostStatus::Terminated);
    assert_eq!(fleet.store.host("fresh").unwrap().status, HostStatus::Running);

    let events = fleet.services.events.find_in_order("idle").await.unwrap();
    assert_eq!(events.len(), 1);
    let change = events[0].host().unwrap();
    assert_eq!(change.old_status(), Some(HostStatus::Running));
    assert_eq!(change.new_status(), Some(HostStatus::Terminated));
}

#[tokio::test]
async fn second_pass_does_not_flag_resolved_hosts() {
    let fleet = TestFleet::new();
    let distros = vec![Distro::new("ubuntu", "ec2", 1)];
    let settings = MonitorSettings::default();
    fleet.store.insert_host(running_host("idle-1", "ubuntu", 60));
    fleet.store.insert_host(running_host("idle-2", "ubuntu", 30));
    fleet.store.insert_host(running_host("fresh", "ubuntu", 0));

    let monitor = monitor(&fleet);
    assert!(monitor.cleanup_hosts(&distros, &settings).await.is_empty());
    let first = fleet.provisioner.calls();
    assert_eq!(first.len(), 2);

    assert!(monitor.cleanup_hosts(&distros, &settings).await.is_empty());
    assert_eq!(fleet.provisioner.calls(), first);
}

#[tokio::test]
async fn excess_busy_host_is_decommissioned_then_terminated_once_idle() {
    let fleet = TestFleet::new();
    let distros = vec![Distro::new("ubuntu", "ec2", 1)];
    let settings = MonitorSettings::default();

    let mut old = running_host("old", "ubuntu", 0);
    old.running_task = Some("t-old".to_string());
    old.creation_time = Utc::now() - Duration::hours(8);
    let mut new = running_host("new", "ubuntu", 0);
    new.running_task = Some("t-new".to_string());
    fleet.store.insert_host(old);
    fleet.store.insert_host(new);

    let monitor = monitor(&fleet);
    assert!(monitor.cleanup_hosts(&distros, &settings).await.is_empty());
    assert_eq!(
        fleet.store.host("old").unwrap().status,
        HostStatus::Decommissioned
    );
    assert_eq!(fleet.store.host("new").unwrap().status, HostStatus::Running);

    // Still busy: a decommissioned host keeps its task.
    assert!(monitor.cleanup_hosts(&distros, &settings).await.is_empty());
    assert_eq!(
        fleet.store.host("old").unwrap().status,
        HostStatus::Decommissioned
    );

    fleet.store.clear_running_task("old", "t-old").await.unwrap();
    assert!(monitor.cleanup_hosts(&distros, &settings).await.is_empty());
    assert_eq!(fleet.store.host("old").unwrap().status, HostStatus::Terminated);
}

#[tokio::test]
async fn provisioner_failure_is_isolated_to_its_host() {
    let fleet = TestFleet::new();
    let distros = vec![Distro::new("ubuntu", "ec2", 10)];
    for id in ["a", "b", "c", "d"] {
        fleet.store.insert_host(running_host(id, "ubuntu", 60));
    }
    fleet.provisioner.fail_for("c");

    let errors = monitor(&fleet)
        .cleanup_hosts(&distros, &MonitorSettings::default())
        .await;

    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], Error::HostCleanup { host_id, .. } if host_id == "c"));
    assert_eq!(errors[0].resource_id(), Some("c"));
    for id in ["a", "b", "d"] {
        assert_eq!(fleet.store.host(id).unwrap().status, HostStatus::Terminated);
    }
    assert_eq!(fleet.store.host("c").unwrap().status, HostStatus::Running);
}

#[tokio::test]
async fn terminating_a_busy_host_clears_its_task() {
    let fleet = TestFleet::new();
    let mut spawn = running_host("spawn", "ubuntu", 0);
    spawn.user_host = true;
    spawn.started_by = "alice".to_string();
    spawn.running_task = Some("t1".to_string());
    spawn.expiration_time = Some(Utc::now() - Duration::minutes(1));
    fleet.store.insert_host(spawn);

    let errors = monitor(&fleet)
        .cleanup_hosts(&[], &MonitorSettings::default())
        .await;
    assert!(errors.is_empty(), "{errors:?}");

    let host = fleet.store.host("spawn").unwrap();
    assert_eq!(host.status, HostStatus::Terminated);
    assert!(host.running_task.is_none());

    let kinds: Vec<_> = fleet
        .services
        .events
        .find_in_order("spawn")
        .await
        .unwrap()
        .iter()
        .map(|e| e.event_type())
        .collect();
    assert_eq!(
        kinds,
        vec![EventType::HostRunningTaskCleared, EventType::HostStatusChanged]
    );
}

#[tokio::test]
async fn stuck_and_failed_hosts_are_terminated_but_static_hosts_are_kept() {
    let fleet = TestFleet::new();
    let distros = vec![
        Distro::new("ubuntu", "ec2", 10),
        Distro::new("lab", STATIC_PROVIDER, 0),
    ];

    let mut stuck = Host::new("stuck", "ubuntu");
    stuck.status = HostStatus::Provisioning;
    stuck.creation_time = Utc::now() - Duration::hours(1);
    let mut failed = Host::new("failed", "ubuntu");
    failed.status = HostStatus::ProvisionFailed;
    let mut lab = Host::new("lab-1", "lab");
    lab.status = HostStatus::Provisioning;
    lab.creation_time = Utc::now() - Duration::hours(1);
    fleet.store.insert_host(stuck);
    fleet.store.insert_host(failed);
    fleet.store.insert_host(lab);
    fleet.store.insert_host(running_host("lab-2", "lab", 600));

    let errors = monitor(&fleet)
        .cleanup_hosts(&distros, &MonitorSettings::default())
        .await;
    assert!(errors.is_empty(), "{errors:?}");

    let live: Vec<String> = fleet
        .store
        .find_hosts(&HostFilter::live())
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.id)
        .collect();
    assert_eq!(live, vec!["lab-1".to_string(), "lab-2".to_string()]);
}

#[tokio::test]
async fn unreachable_host_is_recorded_but_left_running() {
    let fleet = TestFleet::new();
    fleet.store.insert_host(running_host("up", "ubuntu", 0));
    fleet.store.insert_host(running_host("down", "ubuntu", 0));
    fleet
        .prober
        .unreachable
        .lock()
        .unwrap()
        .insert("down".to_string());

    let errors = monitor(&fleet)
        .run_monitoring_checks(&MonitorSettings::default())
        .await;
    assert!(errors.is_empty(), "{errors:?}");

    for id in ["up", "down"] {
        let host = fleet.store.host(id).unwrap();
        assert_eq!(host.status, HostStatus::Running);
        assert!(host.last_reachability_check.is_some());
    }
    let down = fleet.services.events.find_in_order("down").await.unwrap();
    assert_eq!(down.len(), 1);
    assert_eq!(down[0].event_type(), EventType::HostReachabilityFailed);
    assert!(fleet.services.events.find_in_order("up").await.unwrap().is_empty());
}

#[tokio::test]
async fn probe_error_is_a_per_host_error() {
    let fleet = TestFleet::new();
    fleet.store.insert_host(running_host("ok", "ubuntu", 0));
    fleet.store.insert_host(running_host("broken", "ubuntu", 0));
    fleet
        .prober
        .broken
        .lock()
        .unwrap()
        .insert("broken".to_string());

    let errors = monitor(&fleet)
        .run_monitoring_checks(&MonitorSettings::default())
        .await;
    assert_eq!(errors.len(), 1);
    assert!(
        matches!(&errors[0], Error::Check { check, host_id, .. } if check == "reachability" && host_id == "broken")
    );
    assert!(fleet.store.host("ok").unwrap().last_reachability_check.is_some());
}

#[tokio::test]
async fn empty_fleet_has_nothing_to_do() {
    let fleet = TestFleet::new();
    let monitor = monitor(&fleet);
    let settings = MonitorSettings::default();

    assert!(monitor.cleanup_hosts(&[], &settings).await.is_empty());
    assert!(monitor.run_monitoring_checks(&settings).await.is_empty());
    assert!(fleet.provisioner.calls().is_empty());
}
