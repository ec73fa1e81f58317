//! Hosts, tasks, distros, and projects in Postgres.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{Distro, Host, HostStatus, Project, ProjectRef, Task, TaskStatus};
use crate::store::{FleetStore, HostFilter, TaskFilter};

const HOST_COLUMNS: &str = "id, host, distro_id, status, started_by, user_host, creation_time, \
     expiration_time, running_task, last_task_completed_time, last_reachability_check, notifications";

const TASK_COLUMNS: &str =
    "id, display_name, project, host_id, status, execution, dispatch_time, last_heartbeat, details";

fn status_strings<T: ToString>(statuses: &[T]) -> Vec<String> {
    statuses.iter().map(ToString::to_string).collect()
}

impl super::Db {
    async fn get_host(&self, id: &str) -> Result<Host> {
        let row: Option<HostRow> =
            sqlx::query_as(&format!("SELECT {HOST_COLUMNS} FROM hosts WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        row.ok_or_else(|| Error::NotFound(format!("host {id}")))?
            .try_into_host()
    }

    async fn get_task(&self, id: &str) -> Result<Task> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        row.ok_or_else(|| Error::NotFound(format!("task {id}")))?
            .try_into_task()
    }

    /// Report why a conditional update touched no rows.
    async fn host_conflict(&self, id: &str, to: HostStatus) -> Error {
        match self.get_host(id).await {
            Ok(current) => Error::InvalidTransition {
                id: id.to_string(),
                from: current.status.to_string(),
                to: to.to_string(),
            },
            Err(e) => e,
        }
    }

    async fn task_conflict(&self, id: &str, to: TaskStatus) -> Error {
        match self.get_task(id).await {
            Ok(current) => Error::InvalidTransition {
                id: id.to_string(),
                from: current.status.to_string(),
                to: to.to_string(),
            },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl FleetStore for super::Db {
    async fn find_distros(&self) -> Result<Vec<Distro>> {
        let rows: Vec<(String, String, i32)> =
            sqlx::query_as("SELECT id, provider, pool_size FROM distros ORDER BY id")
                .fetch_all(self.pool())
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, provider, pool_size)| Distro::new(id, provider, pool_size.max(0) as usize))
            .collect())
    }

    async fn find_project_refs(&self) -> Result<Vec<ProjectRef>> {
        let rows: Vec<(String, bool)> =
            sqlx::query_as("SELECT identifier, enabled FROM project_refs ORDER BY identifier")
                .fetch_all(self.pool())
                .await?;
        Ok(rows
            .into_iter()
            .map(|(identifier, enabled)| ProjectRef {
                identifier,
                enabled,
            })
            .collect())
    }

    async fn find_project(&self, project_ref: &ProjectRef) -> Result<Option<Project>> {
        let row: Option<(String, String, bool)> = sqlx::query_as(
            "SELECT identifier, display_name, retry_on_heartbeat_timeout
             FROM projects WHERE identifier = $1",
        )
        .bind(&project_ref.identifier)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(
            |(identifier, display_name, retry_on_heartbeat_timeout)| Project {
                identifier,
                display_name,
                retry_on_heartbeat_timeout,
            },
        ))
    }

    async fn find_hosts(&self, filter: &HostFilter) -> Result<Vec<Host>> {
        // An empty status array means any status.
        let rows: Vec<HostRow> = sqlx::query_as(&format!(
            "SELECT {HOST_COLUMNS} FROM hosts
             WHERE (cardinality($1::text[]) = 0 OR status = ANY($1))
             AND ($2::text IS NULL OR distro_id = $2)
             ORDER BY id"
        ))
        .bind(status_strings(&filter.statuses))
        .bind(&filter.distro_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(HostRow::try_into_host).collect()
    }

    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE (cardinality($1::text[]) = 0 OR status = ANY($1))
             AND ($2::text IS NULL OR project = $2)
             ORDER BY id"
        ))
        .bind(status_strings(&filter.statuses))
        .bind(&filter.project)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(TaskRow::try_into_task).collect()
    }

    async fn transition_host(
        &self,
        host_id: &str,
        from: HostStatus,
        to: HostStatus,
    ) -> Result<Host> {
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                id: host_id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let rows_affected = sqlx::query("UPDATE hosts SET status = $1 WHERE id = $2 AND status = $3")
            .bind(to.as_str())
            .bind(host_id)
            .bind(from.as_str())
            .execute(self.pool())
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(self.host_conflict(host_id, to).await);
        }
        self.get_host(host_id).await
    }

    async fn clear_running_task(&self, host_id: &str, task_id: &str) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE hosts SET running_task = NULL, last_task_completed_time = $1
             WHERE id = $2 AND running_task = $3",
        )
        .bind(Utc::now())
        .bind(host_id)
        .bind(task_id)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 0 {
            // Distinguish "points elsewhere" from "no such host".
            self.get_host(host_id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn set_reachability_checked(&self, host_id: &str, at: DateTime<Utc>) -> Result<()> {
        let rows_affected = sqlx::query("UPDATE hosts SET last_reachability_check = $1 WHERE id = $2")
            .bind(at)
            .bind(host_id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if rows_affected == 0 {
            return Err(Error::NotFound(format!("host {host_id}")));
        }
        Ok(())
    }

    async fn mark_notification_sent(&self, host_id: &str, key: &str) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE hosts SET notifications = array_append(notifications, $1)
             WHERE id = $2 AND NOT ($1 = ANY(notifications))",
        )
        .bind(key)
        .bind(host_id)
        .execute(self.pool())
        .await?
        .rows_affected();
        if rows_affected == 0 {
            // Already acked is fine; a missing host is not.
            self.get_host(host_id).await?;
        }
        Ok(())
    }

    async fn fail_task(&self, task_id: &str, from: TaskStatus, details: &str) -> Result<Task> {
        if !from.can_transition_to(TaskStatus::Failed) {
            return Err(Error::InvalidTransition {
                id: task_id.to_string(),
                from: from.to_string(),
                to: TaskStatus::Failed.to_string(),
            });
        }

        let rows_affected = sqlx::query(
            "UPDATE tasks SET status = $1, details = $2 WHERE id = $3 AND status = $4",
        )
        .bind(TaskStatus::Failed.as_str())
        .bind(details)
        .bind(task_id)
        .bind(from.as_str())
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(self.task_conflict(task_id, TaskStatus::Failed).await);
        }
        self.get_task(task_id).await
    }

    async fn reset_task(&self, task_id: &str, from: TaskStatus) -> Result<Task> {
        if !from.can_transition_to(TaskStatus::Undispatched) {
            return Err(Error::InvalidTransition {
                id: task_id.to_string(),
                from: from.to_string(),
                to: TaskStatus::Undispatched.to_string(),
            });
        }

        let rows_affected = sqlx::query(
            "UPDATE tasks SET status = $1, execution = execution + 1, host_id = NULL,
                 dispatch_time = NULL, details = NULL
             WHERE id = $2 AND status = $3",
        )
        .bind(TaskStatus::Undispatched.as_str())
        .bind(task_id)
        .bind(from.as_str())
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(self.task_conflict(task_id, TaskStatus::Undispatched).await);
        }
        self.get_task(task_id).await
    }
}

#[derive(sqlx::FromRow)]
struct HostRow {
    id: String,
    host: String,
    distro_id: String,
    status: String,
    started_by: String,
    user_host: bool,
    creation_time: DateTime<Utc>,
    expiration_time: Option<DateTime<Utc>>,
    running_task: Option<String>,
    last_task_completed_time: Option<DateTime<Utc>>,
    last_reachability_check: Option<DateTime<Utc>>,
    notifications: Vec<String>,
}

impl HostRow {
    fn try_into_host(self) -> Result<Host> {
        Ok(Host {
            id: self.id,
            host: self.host,
            distro_id: self.distro_id,
            status: self.status.parse()?,
            started_by: self.started_by,
            user_host: self.user_host,
            creation_time: self.creation_time,
            expiration_time: self.expiration_time,
            running_task: self.running_task,
            last_task_completed_time: self.last_task_completed_time,
            last_reachability_check: self.last_reachability_check,
            notifications: self.notifications.into_iter().collect::<BTreeSet<_>>(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    display_name: String,
    project: String,
    host_id: Option<String>,
    status: String,
    execution: i32,
    dispatch_time: Option<DateTime<Utc>>,
    last_heartbeat: DateTime<Utc>,
    details: Option<String>,
}

impl TaskRow {
    fn try_into_task(self) -> Result<Task> {
        let execution = u32::try_from(self.execution)
            .map_err(|_| Error::Other(format!("task {} has negative execution", self.id)))?;
        Ok(Task {
            id: self.id,
            display_name: self.display_name,
            project: self.project,
            host_id: self.host_id,
            status: self.status.parse()?,
            execution,
            dispatch_time: self.dispatch_time,
            last_heartbeat: self.last_heartbeat,
            details: self.details,
        })
    }
}
