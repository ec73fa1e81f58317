//! Distros and projects: read-only configuration inputs.

use serde::{Deserialize, Serialize};

/// Provider name for hand-managed machines the monitor must never terminate.
pub const STATIC_PROVIDER: &str = "static";

/// A class of hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distro {
    pub id: String,
    pub provider: String,
    /// Maximum number of system hosts this distro may run.
    pub pool_size: usize,
}

impl Distro {
    pub fn new(id: impl Into<String>, provider: impl Into<String>, pool_size: usize) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            pool_size,
        }
    }

    pub fn is_static(&self) -> bool {
        self.provider == STATIC_PROVIDER
    }
}

/// Pointer to a project's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub identifier: String,
    pub enabled: bool,
}

/// A resolved build project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub identifier: String,
    pub display_name: String,
    /// Requeue tasks that lose their heartbeat instead of failing them outright.
    #[serde(default)]
    pub retry_on_heartbeat_timeout: bool,
}

impl Project {
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            display_name: identifier.clone(),
            identifier,
            retry_on_heartbeat_timeout: false,
        }
    }
}
