//! Terminates and decommissions flagged hosts, and runs host checks.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{Instrument, Span, info};

use super::{FlaggedHost, FleetSnapshot, HostCheck, HostFlagger, run_isolated};
use crate::config::MonitorSettings;
use crate::error::{Error, Result};
use crate::model::{Distro, Host, HostAction, HostStatus};
use crate::services::Services;
use crate::store::HostFilter;
use crate::telemetry::{metrics, monitor};

pub struct HostMonitor {
    services: Services,
    flaggers: Vec<Arc<dyn HostFlagger>>,
    checks: Vec<Arc<dyn HostCheck>>,
}

impl HostMonitor {
    pub fn new(
        services: Services,
        flaggers: Vec<Arc<dyn HostFlagger>>,
        checks: Vec<Arc<dyn HostCheck>>,
    ) -> Self {
        Self {
            services,
            flaggers,
            checks,
        }
    }

    /// Run every flagger in order and act on what it selects.
    ///
    /// Hosts are reloaded before each flagger so it sees what earlier ones
    /// did. A host is acted on at most once per call.
    pub async fn cleanup_hosts(&self, distros: &[Distro], settings: &MonitorSettings) -> Vec<Error> {
        let mut errors = Vec::new();
        let mut handled = HashSet::new();

        for flagger in &self.flaggers {
            let flagged = match self.flag(flagger.as_ref(), distros, settings).await {
                Ok(flagged) => flagged,
                Err(e) => {
                    errors.push(Error::Predicate {
                        name: flagger.name().to_string(),
                        source: Box::new(e),
                    });
                    continue;
                }
            };

            let flagged: Vec<FlaggedHost> = flagged
                .into_iter()
                .filter(|f| handled.insert(f.host.id.clone()))
                .collect();
            if flagged.is_empty() {
                continue;
            }
            info!(flag = flagger.name(), count = flagged.len(), "flagged hosts");
            for f in &flagged {
                metrics::hosts_flagged().add(
                    1,
                    &[
                        KeyValue::new("flag", flagger.name()),
                        KeyValue::new("action", f.action.as_str()),
                    ],
                );
            }

            let failures = run_isolated(flagged, settings.max_concurrent_cleanups, |flagged| {
                let services = self.services.clone();
                async move {
                    let result = cleanup_host(&services, &flagged.host, flagged.action).await;
                    let label = if result.is_ok() { "ok" } else { "error" };
                    metrics::hosts_cleaned().add(
                        1,
                        &[
                            KeyValue::new("action", flagged.action.as_str()),
                            KeyValue::new("result", label),
                        ],
                    );
                    if result.is_ok() {
                        monitor::record_cleanup(
                            &Span::current(),
                            &flagged.host.id,
                            flagged.action.as_str(),
                        );
                    }
                    result.map_err(|e| Error::HostCleanup {
                        host_id: flagged.host.id.clone(),
                        source: Box::new(e),
                    })
                }
                .instrument(Span::current())
            })
            .await;
            errors.extend(failures);
        }
        errors
    }

    /// Run every check on the hosts it selects. Checks never change status.
    pub async fn run_monitoring_checks(&self, settings: &MonitorSettings) -> Vec<Error> {
        let mut errors = Vec::new();

        for check in &self.checks {
            let now = Utc::now();
            let selected = match self.select(check.as_ref(), settings).await {
                Ok(hosts) => hosts,
                Err(e) => {
                    errors.push(Error::Predicate {
                        name: check.name().to_string(),
                        source: Box::new(e),
                    });
                    continue;
                }
            };
            if selected.is_empty() {
                continue;
            }
            info!(check = check.name(), count = selected.len(), "checking hosts");

            let failures = run_isolated(selected, settings.max_concurrent_cleanups, |host| {
                let services = self.services.clone();
                let check = Arc::clone(check);
                async move {
                    check
                        .check(&host, &services, now)
                        .await
                        .map_err(|e| Error::Check {
                            check: check.name().to_string(),
                            host_id: host.id.clone(),
                            source: Box::new(e),
                        })
                }
                .instrument(Span::current())
            })
            .await;
            errors.extend(failures);
        }
        errors
    }

    async fn flag(
        &self,
        flagger: &dyn HostFlagger,
        distros: &[Distro],
        settings: &MonitorSettings,
    ) -> Result<Vec<FlaggedHost>> {
        let hosts = self.services.store.find_hosts(&HostFilter::live()).await?;
        flagger.flag(&FleetSnapshot {
            hosts: &hosts,
            distros,
            settings,
            now: Utc::now(),
        })
    }

    async fn select(&self, check: &dyn HostCheck, settings: &MonitorSettings) -> Result<Vec<Host>> {
        let hosts = self
            .services
            .store
            .find_hosts(&HostFilter::status(HostStatus::Running))
            .await?;
        // Checks select on host fields alone.
        check.select(&FleetSnapshot {
            hosts: &hosts,
            distros: &[],
            settings,
            now: Utc::now(),
        })
    }
}

/// Carry out one cleanup action: provisioner first, then the store, then
/// the audit trail.
async fn cleanup_host(services: &Services, host: &Host, action: HostAction) -> Result<()> {
    services.provisioner.apply(host, action).await?;

    if action == HostAction::Terminate {
        if let Some(task_id) = &host.running_task {
            if services.store.clear_running_task(&host.id, task_id).await? {
                services
                    .events
                    .log_host_running_task_cleared(&host.id, task_id)
                    .await?;
            }
        }
    }

    let target = action.target_status();
    let updated = services
        .store
        .transition_host(&host.id, host.status, target)
        .await?;
    services
        .events
        .log_host_status_changed(&host.id, host.status, updated.status)
        .await?;

    info!(host_id = %host.id, from = %host.status, to = %updated.status, "cleaned up host");
    Ok(())
}
