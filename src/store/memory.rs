//! In-process store.
//!
//! Holds the whole fleet behind one mutex. Used for dry runs and tests;
//! [`Fault`]s make individual operations fail so failure paths can be
//! exercised without a database.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{EventStore, FleetStore, HostFilter, TaskFilter};
use crate::error::{Error, Result};
use crate::event::{Event, NewEvent};
use crate::model::{Distro, Host, HostStatus, Project, ProjectRef, Task, TaskStatus};

/// An operation to make fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    FindDistros,
    FindProjectRefs,
    /// Resolving the project with this identifier.
    FindProject(String),
    FindHosts,
    FindTasks,
    /// Any write to this host or task id.
    Write(String),
    InsertEvent,
}

#[derive(Default)]
struct State {
    distros: Vec<Distro>,
    project_refs: Vec<ProjectRef>,
    projects: BTreeMap<String, Project>,
    hosts: BTreeMap<String, Host>,
    tasks: BTreeMap<String, Task>,
    events: Vec<Event>,
    next_seq: i64,
    faults: HashSet<Fault>,
}

impl State {
    fn check(&self, fault: Fault) -> Result<()> {
        if self.faults.contains(&fault) {
            Err(Error::Other(format!("injected fault: {fault:?}")))
        } else {
            Ok(())
        }
    }

    fn check_write(&self, id: &str) -> Result<()> {
        self.check(Fault::Write(id.to_string()))
    }

    fn host_mut(&mut self, id: &str) -> Result<&mut Host> {
        self.hosts
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("host {id}")))
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
    }
}

/// Fleet and event store held in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_distro(&self, distro: Distro) {
        self.lock().distros.push(distro);
    }

    /// Add a project and a ref pointing at it.
    pub fn insert_project(&self, project: Project) {
        let mut state = self.lock();
        state.project_refs.push(ProjectRef {
            identifier: project.identifier.clone(),
            enabled: true,
        });
        state.projects.insert(project.identifier.clone(), project);
    }

    /// Add a ref without a project behind it.
    pub fn insert_project_ref(&self, project_ref: ProjectRef) {
        self.lock().project_refs.push(project_ref);
    }

    pub fn insert_host(&self, host: Host) {
        self.lock().hosts.insert(host.id.clone(), host);
    }

    pub fn insert_task(&self, task: Task) {
        self.lock().tasks.insert(task.id.clone(), task);
    }

    pub fn host(&self, id: &str) -> Option<Host> {
        self.lock().hosts.get(id).cloned()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.lock().tasks.get(id).cloned()
    }

    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }
}

#[async_trait]
impl FleetStore for MemoryStore {
    async fn find_distros(&self) -> Result<Vec<Distro>> {
        let state = self.lock();
        state.check(Fault::FindDistros)?;
        Ok(state.distros.clone())
    }

    async fn find_project_refs(&self) -> Result<Vec<ProjectRef>> {
        let state = self.lock();
        state.check(Fault::FindProjectRefs)?;
        Ok(state.project_refs.clone())
    }

    async fn find_project(&self, project_ref: &ProjectRef) -> Result<Option<Project>> {
        let state = self.lock();
        state.check(Fault::FindProject(project_ref.identifier.clone()))?;
        Ok(state.projects.get(&project_ref.identifier).cloned())
    }

    async fn find_hosts(&self, filter: &HostFilter) -> Result<Vec<Host>> {
        let state = self.lock();
        state.check(Fault::FindHosts)?;
        Ok(state
            .hosts
            .values()
            .filter(|h| filter.matches(h))
            .cloned()
            .collect())
    }

    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let state = self.lock();
        state.check(Fault::FindTasks)?;
        Ok(state
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn transition_host(
        &self,
        host_id: &str,
        from: HostStatus,
        to: HostStatus,
    ) -> Result<Host> {
        let mut state = self.lock();
        state.check_write(host_id)?;
        let host = state.host_mut(host_id)?;
        if host.status != from || !from.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                id: host_id.to_string(),
                from: host.status.to_string(),
                to: to.to_string(),
            });
        }
        host.status = to;
        Ok(host.clone())
    }

    async fn clear_running_task(&self, host_id: &str, task_id: &str) -> Result<bool> {
        let mut state = self.lock();
        state.check_write(host_id)?;
        let host = state.host_mut(host_id)?;
        if host.running_task.as_deref() != Some(task_id) {
            return Ok(false);
        }
        host.running_task = None;
        host.last_task_completed_time = Some(Utc::now());
        Ok(true)
    }

    async fn set_reachability_checked(&self, host_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock();
        state.check_write(host_id)?;
        state.host_mut(host_id)?.last_reachability_check = Some(at);
        Ok(())
    }

    async fn mark_notification_sent(&self, host_id: &str, key: &str) -> Result<()> {
        let mut state = self.lock();
        state.check_write(host_id)?;
        state.host_mut(host_id)?.notifications.insert(key.to_string());
        Ok(())
    }

    async fn fail_task(&self, task_id: &str, from: TaskStatus, details: &str) -> Result<Task> {
        let mut state = self.lock();
        state.check_write(task_id)?;
        let task = state.task_mut(task_id)?;
        check_task_transition(task, from, TaskStatus::Failed)?;
        task.status = TaskStatus::Failed;
        task.details = Some(details.to_string());
        Ok(task.clone())
    }

    async fn reset_task(&self, task_id: &str, from: TaskStatus) -> Result<Task> {
        let mut state = self.lock();
        state.check_write(task_id)?;
        let task = state.task_mut(task_id)?;
        check_task_transition(task, from, TaskStatus::Undispatched)?;
        task.status = TaskStatus::Undispatched;
        task.execution += 1;
        task.host_id = None;
        task.dispatch_time = None;
        task.details = None;
        Ok(task.clone())
    }
}

fn check_task_transition(task: &Task, from: TaskStatus, to: TaskStatus) -> Result<()> {
    if task.status == from && from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            id: task.id.clone(),
            from: task.status.to_string(),
            to: to.to_string(),
        })
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: NewEvent) -> Result<Event> {
        let mut state = self.lock();
        state.check(Fault::InsertEvent)?;
        state.next_seq += 1;
        let event = Event {
            seq: state.next_seq,
            resource_id: event.resource_id,
            timestamp: event.timestamp,
            data: event.data,
        };
        state.events.push(event.clone());
        Ok(event)
    }

    async fn find_events(&self, resource_id: &str) -> Result<Vec<Event>> {
        let state = self.lock();
        let mut events: Vec<Event> = state
            .events
            .iter()
            .filter(|e| e.resource_id == resource_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));
        Ok(events)
    }

    async fn clear_events(&self) -> Result<u64> {
        let mut state = self.lock();
        let removed = state.events.len() as u64;
        state.events.clear();
        Ok(removed)
    }
}
