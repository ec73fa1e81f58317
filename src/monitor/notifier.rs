//! Builds and delivers fleet warnings.

use std::sync::Arc;

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{Instrument, Span, debug};

use super::{FleetSnapshot, NotificationBuilder, run_isolated};
use crate::config::MonitorSettings;
use crate::error::{Error, Result};
use crate::model::Notification;
use crate::services::Services;
use crate::store::HostFilter;
use crate::telemetry::metrics;

pub struct Notifier {
    services: Services,
    builders: Vec<Arc<dyn NotificationBuilder>>,
}

impl Notifier {
    pub fn new(services: Services, builders: Vec<Arc<dyn NotificationBuilder>>) -> Self {
        Self { services, builders }
    }

    /// Build every pending warning, deliver it, and ack it on its host.
    pub async fn notify(&self, settings: &MonitorSettings) -> Vec<Error> {
        let hosts = match self.services.store.find_hosts(&HostFilter::live()).await {
            Ok(hosts) => hosts,
            Err(e) => return vec![e],
        };
        let fleet = FleetSnapshot {
            hosts: &hosts,
            distros: &[],
            settings,
            now: Utc::now(),
        };

        let mut errors = Vec::new();
        let mut pending = Vec::new();
        for builder in &self.builders {
            match builder.build(&fleet) {
                Ok(notifications) => {
                    debug!(builder = builder.name(), count = notifications.len(), "built notifications");
                    pending.extend(notifications);
                }
                Err(e) => errors.push(Error::Predicate {
                    name: builder.name().to_string(),
                    source: Box::new(e),
                }),
            }
        }

        let failures = run_isolated(pending, settings.max_concurrent_cleanups, |notification| {
            let services = self.services.clone();
            async move {
                let result = deliver(&services, &notification).await;
                let label = if result.is_ok() { "ok" } else { "error" };
                metrics::notifications_sent().add(1, &[KeyValue::new("result", label)]);
                result.map_err(|e| Error::Notification {
                    recipient: notification.recipient.clone(),
                    host_id: notification.ack.as_ref().map(|ack| ack.host_id.clone()),
                    source: Box::new(e),
                })
            }
            .instrument(Span::current())
        })
        .await;
        errors.extend(failures);
        errors
    }
}

async fn deliver(services: &Services, notification: &Notification) -> Result<()> {
    services.mailer.send(notification).await?;
    if let Some(ack) = &notification.ack {
        services
            .store
            .mark_notification_sent(&ack.host_id, &ack.key)
            .await?;
    }
    debug!(recipient = %notification.recipient, subject = %notification.subject, "notification sent");
    Ok(())
}
