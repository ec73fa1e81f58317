//! Error types for fleet-monitor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("provisioner failed for host {host_id}: {message}")]
    Provision { host_id: String, message: String },

    #[error("delivery to {recipient} failed: {message}")]
    Delivery { recipient: String, message: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("flagging function {name} failed: {source}")]
    Predicate {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("cleaning up host {host_id}: {source}")]
    HostCleanup {
        host_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("cleaning up task {task_id}: {source}")]
    TaskCleanup {
        task_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("check {check} on host {host_id}: {source}")]
    Check {
        check: String,
        host_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("notification for {recipient}: {source}")]
    Notification {
        recipient: String,
        /// Host the notification is about, when it has one.
        host_id: Option<String>,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The host or task id a per-item error is about, if any.
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Error::HostCleanup { host_id, .. }
            | Error::Check { host_id, .. }
            | Error::Provision { host_id, .. } => Some(host_id),
            Error::TaskCleanup { task_id, .. } => Some(task_id),
            Error::InvalidTransition { id, .. } => Some(id),
            Error::Notification {
                host_id: Some(host_id),
                ..
            } => Some(host_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
