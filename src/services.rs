//! External collaborators and the bundle the monitors run against.
//!
//! The monitor decides what should happen to hosts and who should hear
//! about it; these traits are where it hands that off. Each has one
//! adapter here so the binary can run on its own: hook commands for
//! provisioning and delivery, and a TCP connect for liveness.

pub mod command;
pub mod probe;

pub use command::{CommandMailer, CommandProvisioner};
pub use probe::TcpProber;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::event::EventLog;
use crate::model::{Host, HostAction, Notification};
use crate::store::{EventStore, FleetStore};

/// Carries out terminate/decommission at the infrastructure level.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn apply(&self, host: &Host, action: HostAction) -> Result<()>;
}

/// Liveness probe. `Ok(false)` means the host answered nothing;
/// `Err` means the probe itself could not run.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: &Host) -> Result<bool>;
}

/// Delivers a notification to its recipient.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Everything a monitoring run talks to.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn FleetStore>,
    pub events: EventLog,
    pub provisioner: Arc<dyn Provisioner>,
    pub prober: Arc<dyn Prober>,
    pub mailer: Arc<dyn Mailer>,
}

impl Services {
    pub fn new(
        store: Arc<dyn FleetStore>,
        event_store: Arc<dyn EventStore>,
        provisioner: Arc<dyn Provisioner>,
        prober: Arc<dyn Prober>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            events: EventLog::new(event_store),
            provisioner,
            prober,
            mailer,
        }
    }
}
