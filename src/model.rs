//! Core data model.
//!
//! Hosts and tasks are owned by the data store; the monitor reads them to
//! decide what to clean up and writes status changes back. Distros and
//! projects are read-only inputs.

pub mod host;
pub mod notification;
pub mod project;
pub mod task;

pub use host::{Host, HostAction, HostStatus, SYSTEM_USER};
pub use notification::{Notification, NotificationAck};
pub use project::{Distro, Project, ProjectRef, STATIC_PROVIDER};
pub use task::{Task, TaskStatus};
