//! Non-terminating host checks.
//!
//! A check observes hosts and records what it sees; it never changes a
//! host's status.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::FleetSnapshot;
use crate::error::Result;
use crate::model::{Host, HostStatus};
use crate::services::Services;

#[async_trait]
pub trait HostCheck: Send + Sync {
    fn name(&self) -> &'static str;

    /// Hosts due for this check.
    fn select(&self, fleet: &FleetSnapshot<'_>) -> Result<Vec<Host>>;

    async fn check(&self, host: &Host, services: &Services, now: DateTime<Utc>) -> Result<()>;
}

pub fn defaults() -> Vec<Arc<dyn HostCheck>> {
    vec![Arc::new(Reachability)]
}

/// Probes running hosts that have not been checked recently.
pub struct Reachability;

#[async_trait]
impl HostCheck for Reachability {
    fn name(&self) -> &'static str {
        "reachability"
    }

    fn select(&self, fleet: &FleetSnapshot<'_>) -> Result<Vec<Host>> {
        let due = fleet.now - fleet.settings.reachability_interval();
        Ok(fleet
            .hosts
            .iter()
            .filter(|h| {
                h.status == HostStatus::Running
                    && !h.host.is_empty()
                    && h.last_reachability_check.is_none_or(|at| at < due)
            })
            .cloned()
            .collect())
    }

    async fn check(&self, host: &Host, services: &Services, now: DateTime<Utc>) -> Result<()> {
        let reachable = services.prober.probe(host).await?;
        services.store.set_reachability_checked(&host.id, now).await?;

        if !reachable {
            warn!(host_id = %host.id, hostname = %host.host, "host unreachable");
            services.events.log_host_reachability_failed(&host.id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorSettings;
    use chrono::Duration;

    fn running(id: &str, hostname: &str) -> Host {
        let mut host = Host::new(id, "ubuntu");
        host.status = HostStatus::Running;
        host.host = hostname.to_string();
        host
    }

    #[test]
    fn selects_running_hosts_due_for_a_probe() {
        let now = Utc::now();
        let settings = MonitorSettings::default();

        let never = running("never", "a.example.com");
        let mut stale = running("stale", "b.example.com");
        stale.last_reachability_check = Some(now - Duration::minutes(30));
        let mut recent = running("recent", "c.example.com");
        recent.last_reachability_check = Some(now - Duration::minutes(1));
        let nameless = running("nameless", "");
        let mut starting = running("starting", "d.example.com");
        starting.status = HostStatus::Provisioning;
        let hosts = vec![never, stale, recent, nameless, starting];

        let selected = Reachability
            .select(&FleetSnapshot {
                hosts: &hosts,
                distros: &[],
                settings: &settings,
                now,
            })
            .unwrap();

        let ids: Vec<_> = selected.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["never", "stale"]);
    }
}
