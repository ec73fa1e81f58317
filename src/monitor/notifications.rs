//! Notification builders.
//!
//! Each builder turns the fleet into warnings that have not been sent yet.
//! A warning carries an ack so the notifier can mark it sent on the host
//! once delivered.

use std::sync::Arc;

use super::FleetSnapshot;
use crate::error::Result;
use crate::model::{Notification, NotificationAck};

/// Ack key for the slow provisioning warning sent to one admin.
pub fn slow_provisioning_key(recipient: &str) -> String {
    format!("slow-provisioning:{recipient}")
}

/// Ack key for the expiration warning sent `hours` ahead.
pub fn expiration_key(hours: i64) -> String {
    format!("expiration-{hours}h")
}

pub trait NotificationBuilder: Send + Sync {
    fn name(&self) -> &'static str;

    fn build(&self, fleet: &FleetSnapshot<'_>) -> Result<Vec<Notification>>;
}

pub fn defaults() -> Vec<Arc<dyn NotificationBuilder>> {
    vec![
        Arc::new(SpawnHostExpirationWarnings),
        Arc::new(SlowProvisioningWarnings),
    ]
}

/// Warns spawn host owners ahead of expiration.
///
/// Only the tightest threshold the host has crossed is sent. Looser ones
/// are never sent afterwards, since the crossed set only grows tighter.
pub struct SpawnHostExpirationWarnings;

impl NotificationBuilder for SpawnHostExpirationWarnings {
    fn name(&self) -> &'static str {
        "spawn_host_expiration"
    }

    fn build(&self, fleet: &FleetSnapshot<'_>) -> Result<Vec<Notification>> {
        let mut out = Vec::new();
        for host in fleet
            .hosts
            .iter()
            .filter(|h| h.user_host && !h.status.is_terminal())
        {
            let Some(expires) = host.expiration_time else {
                continue;
            };
            if expires <= fleet.now {
                continue;
            }
            let remaining = expires - fleet.now;
            let Some(hours) = fleet
                .settings
                .expiration_warning_hours
                .iter()
                .copied()
                .filter(|&hours| remaining <= chrono::Duration::hours(hours))
                .min()
            else {
                continue;
            };
            let key = expiration_key(hours);
            if host.notification_sent(&key) {
                continue;
            }
            out.push(Notification {
                recipient: host.started_by.clone(),
                subject: format!("Spawn host {} expires within {hours} hours", host.id),
                body: format!(
                    "Your spawn host {} ({}) will be terminated at {}.",
                    host.id,
                    host.host,
                    expires.to_rfc3339()
                ),
                ack: Some(NotificationAck {
                    host_id: host.id.clone(),
                    key,
                }),
            });
        }
        Ok(out)
    }
}

/// Tells admins about system hosts stuck starting.
pub struct SlowProvisioningWarnings;

impl NotificationBuilder for SlowProvisioningWarnings {
    fn name(&self) -> &'static str {
        "slow_provisioning"
    }

    fn build(&self, fleet: &FleetSnapshot<'_>) -> Result<Vec<Notification>> {
        let threshold = fleet.settings.slow_provisioning_threshold();
        let mut out = Vec::new();
        for host in fleet.hosts.iter().filter(|h| {
            !h.user_host && h.status.is_starting() && fleet.now - h.creation_time > threshold
        }) {
            let minutes = (fleet.now - host.creation_time).num_minutes();
            // Acked per admin so one failed delivery is retried on its own.
            for admin in &fleet.settings.admin_recipients {
                let key = slow_provisioning_key(admin);
                if host.notification_sent(&key) {
                    continue;
                }
                out.push(Notification {
                    recipient: admin.clone(),
                    subject: format!("Host {} slow to provision", host.id),
                    body: format!(
                        "Host {} (distro {}) has been {} for {minutes} minutes.",
                        host.id, host.distro_id, host.status
                    ),
                    ack: Some(NotificationAck {
                        host_id: host.id.clone(),
                        key,
                    }),
                });
            }
        }
        Ok(out)
    }
}
