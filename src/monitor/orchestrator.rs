//! One full monitoring pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use super::{
    HostCheck, HostFlagger, HostMonitor, NotificationBuilder, Notifier, TaskFlagger, TaskMonitor,
    checks, host_flags, notifications, task_flags,
};
use crate::config::MonitorSettings;
use crate::error::{Error, Result};
use crate::model::Distro;
use crate::services::Services;
use crate::telemetry::{metrics, monitor};

/// The predicate registries a run evaluates, in order.
#[derive(Clone)]
pub struct Policies {
    pub task_flaggers: Vec<Arc<dyn TaskFlagger>>,
    pub host_flaggers: Vec<Arc<dyn HostFlagger>>,
    pub host_checks: Vec<Arc<dyn HostCheck>>,
    pub notification_builders: Vec<Arc<dyn NotificationBuilder>>,
}

impl Policies {
    pub fn defaults() -> Self {
        Self {
            task_flaggers: task_flags::defaults(),
            host_flaggers: host_flags::defaults(),
            host_checks: checks::defaults(),
            notification_builders: notifications::defaults(),
        }
    }
}

impl Default for Policies {
    fn default() -> Self {
        Self::defaults()
    }
}

/// What a run did not manage to do.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Projects whose tasks were considered.
    pub projects: usize,
    /// Project refs that could not be resolved.
    pub skipped_projects: Vec<String>,
    pub task_errors: Vec<Error>,
    pub host_errors: Vec<Error>,
    pub check_errors: Vec<Error>,
    pub notification_errors: Vec<Error>,
}

impl RunSummary {
    pub fn total_errors(&self) -> usize {
        self.task_errors.len()
            + self.host_errors.len()
            + self.check_errors.len()
            + self.notification_errors.len()
    }

    pub fn is_clean(&self) -> bool {
        self.total_errors() == 0
    }
}

/// Run every monitoring stage with the default policies.
pub async fn run_all_monitoring(services: &Services, settings: &MonitorSettings) -> Result<RunSummary> {
    run_with_policies(services, settings, Policies::defaults()).await
}

/// Run every monitoring stage with an explicit set of policies.
///
/// Fails only if distros or project refs cannot be loaded; every other
/// failure is collected into the summary.
pub async fn run_with_policies(
    services: &Services,
    settings: &MonitorSettings,
    policies: Policies,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let span = monitor::start_run_span(&run_id);
    let started = Instant::now();

    let result = run_stages(services, settings, policies)
        .instrument(span.clone())
        .await;

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match &result {
        Ok(summary) => {
            monitor::record_run_errors(&span, summary.total_errors());
            metrics::run_duration_ms().record(elapsed_ms, &[KeyValue::new("result", "ok")]);
            span.in_scope(|| {
                info!(
                    %run_id,
                    errors = summary.total_errors(),
                    elapsed_ms,
                    "monitoring run finished"
                )
            });
        }
        Err(e) => {
            metrics::run_duration_ms().record(elapsed_ms, &[KeyValue::new("result", "fatal")]);
            span.in_scope(|| error!(%run_id, error = %e, "monitoring run aborted"));
        }
    }
    result
}

async fn run_stages(
    services: &Services,
    settings: &MonitorSettings,
    policies: Policies,
) -> Result<RunSummary> {
    let distros: Vec<Distro> = services.store.find_distros().await?;
    let refs = services.store.find_project_refs().await?;

    let mut summary = RunSummary::default();
    let mut projects = HashMap::new();
    for project_ref in refs.iter().filter(|r| r.enabled) {
        match services.store.find_project(project_ref).await {
            Ok(Some(project)) => {
                projects.insert(project.identifier.clone(), project);
            }
            Ok(None) => {
                warn!(project = %project_ref.identifier, "project ref points at no project, skipping");
                summary.skipped_projects.push(project_ref.identifier.clone());
            }
            Err(e) => {
                error!(project = %project_ref.identifier, error = %e, "failed to load project, skipping");
                summary.skipped_projects.push(project_ref.identifier.clone());
            }
        }
    }
    summary.projects = projects.len();
    info!(
        distros = distros.len(),
        projects = summary.projects,
        skipped = summary.skipped_projects.len(),
        "starting monitoring run"
    );

    let tasks = TaskMonitor::new(services.clone(), policies.task_flaggers);
    let hosts = HostMonitor::new(services.clone(), policies.host_flaggers, policies.host_checks);
    let notifier = Notifier::new(services.clone(), policies.notification_builders);

    summary.task_errors = stage("tasks", tasks.cleanup_tasks(&projects, settings)).await;
    summary.host_errors = stage("hosts", hosts.cleanup_hosts(&distros, settings)).await;
    summary.check_errors = stage("checks", hosts.run_monitoring_checks(settings)).await;
    summary.notification_errors = stage("notify", notifier.notify(settings)).await;

    Ok(summary)
}

/// Run one stage inside its span, then log and count what went wrong.
async fn stage<F>(name: &'static str, work: F) -> Vec<Error>
where
    F: std::future::Future<Output = Vec<Error>>,
{
    let span = monitor::start_stage_span(name);
    let errors = work.instrument(span.clone()).await;

    monitor::record_run_errors(&span, errors.len());
    if !errors.is_empty() {
        metrics::stage_errors().add(errors.len() as u64, &[KeyValue::new("stage", name)]);
    }
    for e in &errors {
        error!(stage = name, resource_id = e.resource_id(), error = %e, "monitoring stage error");
    }
    errors
}
