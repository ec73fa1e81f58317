//! Cleans up tasks flagged by the task flagging functions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{info, warn};

use super::{TaskFlagger, TaskSnapshot, run_isolated};
use crate::config::MonitorSettings;
use crate::error::{Error, Result};
use crate::model::{Project, Task};
use crate::services::Services;
use crate::store::TaskFilter;
use crate::telemetry::metrics;

/// Details recorded on a task failed for not heartbeating.
pub const HEARTBEAT_TIMEOUT_DETAILS: &str = "heartbeat timeout";

pub struct TaskMonitor {
    services: Services,
    flaggers: Vec<Arc<dyn TaskFlagger>>,
}

impl TaskMonitor {
    pub fn new(services: Services, flaggers: Vec<Arc<dyn TaskFlagger>>) -> Self {
        Self { services, flaggers }
    }

    /// Run every flagger and clean up what it selects.
    ///
    /// `projects` maps project identifiers to the resolved projects; a task
    /// whose project is missing from it fails on its own.
    pub async fn cleanup_tasks(
        &self,
        projects: &HashMap<String, Project>,
        settings: &MonitorSettings,
    ) -> Vec<Error> {
        let mut errors = Vec::new();
        let mut handled = HashSet::new();

        for flagger in &self.flaggers {
            let flagged = match self.flag(flagger.as_ref(), settings).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    errors.push(Error::Predicate {
                        name: flagger.name().to_string(),
                        source: Box::new(e),
                    });
                    continue;
                }
            };

            let items: Vec<(Task, Option<Project>)> = flagged
                .into_iter()
                .filter(|t| handled.insert(t.id.clone()))
                .map(|t| {
                    let project = projects.get(&t.project).cloned();
                    (t, project)
                })
                .collect();
            if items.is_empty() {
                continue;
            }
            info!(flag = flagger.name(), count = items.len(), "flagged tasks");

            let max_executions = settings.max_task_executions;
            let failures = run_isolated(items, settings.max_concurrent_cleanups, |(task, project)| {
                let services = self.services.clone();
                async move {
                    let outcome =
                        cleanup_task(&services, &task, project.as_ref(), max_executions).await;
                    let label = match &outcome {
                        Ok(label) => *label,
                        Err(_) => "error",
                    };
                    metrics::tasks_cleaned().add(1, &[KeyValue::new("outcome", label)]);
                    outcome.map(|_| ()).map_err(|e| Error::TaskCleanup {
                        task_id: task.id.clone(),
                        source: Box::new(e),
                    })
                }
            })
            .await;
            errors.extend(failures);
        }
        errors
    }

    async fn flag(&self, flagger: &dyn TaskFlagger, settings: &MonitorSettings) -> Result<Vec<Task>> {
        let tasks = self.services.store.find_tasks(&TaskFilter::in_flight()).await?;
        flagger.flag(&TaskSnapshot {
            tasks: &tasks,
            settings,
            now: Utc::now(),
        })
    }
}

/// Release the task's host, then requeue or fail the task. Returns the
/// outcome label ("reset" or "failed").
///
/// The host goes first: a task left in flight is flagged again next pass,
/// while a host still pointing at a finished task would never look idle.
async fn cleanup_task(
    services: &Services,
    task: &Task,
    project: Option<&Project>,
    max_executions: u32,
) -> Result<&'static str> {
    let project = project.ok_or_else(|| Error::NotFound(format!("project {}", task.project)))?;

    if let Some(host_id) = &task.host_id {
        if services.store.clear_running_task(host_id, &task.id).await? {
            services
                .events
                .log_host_running_task_cleared(host_id, &task.id)
                .await?;
        } else {
            warn!(task_id = %task.id, %host_id, "host no longer running task");
        }
    }

    let outcome = if project.retry_on_heartbeat_timeout && task.execution + 1 < max_executions {
        services.store.reset_task(&task.id, task.status).await?;
        "reset"
    } else {
        services
            .store
            .fail_task(&task.id, task.status, HEARTBEAT_TIMEOUT_DETAILS)
            .await?;
        "failed"
    };

    info!(task_id = %task.id, execution = task.execution, outcome, "cleaned up task");
    Ok(outcome)
}
