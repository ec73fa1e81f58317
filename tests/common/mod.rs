//! Shared fixtures: an in-memory fleet with recording collaborators.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use fleet_monitor::error::{Error, Result};
use fleet_monitor::model::{Host, HostAction, HostStatus, Notification, Task, TaskStatus};
use fleet_monitor::services::{Mailer, Prober, Provisioner, Services};
use fleet_monitor::store::MemoryStore;

#[derive(Default)]
pub struct RecordingProvisioner {
    pub calls: Mutex<Vec<(String, HostAction)>>,
    pub failing: Mutex<HashSet<String>>,
}

impl RecordingProvisioner {
    pub fn fail_for(&self, host_id: &str) {
        self.failing.lock().unwrap().insert(host_id.to_string());
    }

    pub fn calls(&self) -> Vec<(String, HostAction)> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort_by(|a, b| a.0.cmp(&b.0));
        calls
    }
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    async fn apply(&self, host: &Host, action: HostAction) -> Result<()> {
        if self.failing.lock().unwrap().contains(&host.id) {
            return Err(Error::Provision {
                host_id: host.id.clone(),
                message: "provider said no".to_string(),
            });
        }
        self.calls.lock().unwrap().push((host.id.clone(), action));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProber {
    pub unreachable: Mutex<HashSet<String>>,
    pub broken: Mutex<HashSet<String>>,
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, host: &Host) -> Result<bool> {
        if self.broken.lock().unwrap().contains(&host.id) {
            return Err(Error::Other("probe crashed".to_string()));
        }
        Ok(!self.unreachable.lock().unwrap().contains(&host.id))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Notification>>,
    pub failing: Mutex<HashSet<String>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, notification: &Notification) -> Result<()> {
        if self.failing.lock().unwrap().contains(&notification.recipient) {
            return Err(Error::Delivery {
                recipient: notification.recipient.clone(),
                message: "mailbox full".to_string(),
            });
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// An in-memory fleet wired to recording collaborators.
pub struct TestFleet {
    pub store: Arc<MemoryStore>,
    pub provisioner: Arc<RecordingProvisioner>,
    pub prober: Arc<FakeProber>,
    pub mailer: Arc<RecordingMailer>,
    pub services: Services,
}

impl TestFleet {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let provisioner = Arc::new(RecordingProvisioner::default());
        let prober = Arc::new(FakeProber::default());
        let mailer = Arc::new(RecordingMailer::default());
        let services = Services::new(
            store.clone(),
            store.clone(),
            provisioner.clone(),
            prober.clone(),
            mailer.clone(),
        );
        Self {
            store,
            provisioner,
            prober,
            mailer,
            services,
        }
    }
}

/// A running system host that finished its last task `idle_mins` ago.
pub fn running_host(id: &str, distro: &str, idle_mins: i64) -> Host {
    let now = Utc::now();
    let mut host = Host::new(id, distro);
    host.host = format!("{id}.example.com");
    host.status = HostStatus::Running;
    host.creation_time = now - Duration::hours(3);
    host.last_task_completed_time = Some(now - Duration::minutes(idle_mins));
    host
}

/// A task on `host_id` that last heartbeated `silent_mins` ago.
pub fn started_task(id: &str, project: &str, host_id: &str, silent_mins: i64) -> Task {
    let mut task = Task::new(id, project);
    task.status = TaskStatus::Started;
    task.host_id = Some(host_id.to_string());
    task.dispatch_time = Some(Utc::now() - Duration::minutes(silent_mins + 1));
    task.last_heartbeat = Utc::now() - Duration::minutes(silent_mins);
    task
}
