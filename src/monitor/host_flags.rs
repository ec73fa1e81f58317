//! Host flagging functions: which hosts to terminate or decommission.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{Host, HostAction, HostStatus};

use super::FleetSnapshot;

/// A host selected for cleanup, and what to do with it.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedHost {
    pub host: Host,
    pub action: HostAction,
}

impl FlaggedHost {
    pub fn terminate(host: &Host) -> Self {
        Self {
            host: host.clone(),
            action: HostAction::Terminate,
        }
    }

    pub fn decommission(host: &Host) -> Self {
        Self {
            host: host.clone(),
            action: HostAction::Decommission,
        }
    }
}

/// Selects hosts matching one lifecycle condition.
pub trait HostFlagger: Send + Sync {
    fn name(&self) -> &'static str;

    fn flag(&self, fleet: &FleetSnapshot<'_>) -> Result<Vec<FlaggedHost>>;
}

/// Every host flagger, in the order the host monitor runs them.
pub fn defaults() -> Vec<Arc<dyn HostFlagger>> {
    vec![
        Arc::new(DecommissionedHosts),
        Arc::new(IdleHosts),
        Arc::new(ExcessHosts),
        Arc::new(UnprovisionedHosts),
        Arc::new(ProvisionFailedHosts),
        Arc::new(ExpiredHosts),
    ]
}

/// Decommissioned hosts that have finished their last task.
pub struct DecommissionedHosts;

impl HostFlagger for DecommissionedHosts {
    fn name(&self) -> &'static str {
        "decommissioned"
    }

    fn flag(&self, fleet: &FleetSnapshot<'_>) -> Result<Vec<FlaggedHost>> {
        Ok(fleet
            .hosts
            .iter()
            .filter(|h| h.status == HostStatus::Decommissioned && h.is_idle())
            .map(FlaggedHost::terminate)
            .collect())
    }
}

/// Running system hosts without a task for longer than the idle cutoff.
pub struct IdleHosts;

impl HostFlagger for IdleHosts {
    fn name(&self) -> &'static str {
        "idle"
    }

    fn flag(&self, fleet: &FleetSnapshot<'_>) -> Result<Vec<FlaggedHost>> {
        let cutoff = fleet.settings.idle_cutoff();
        Ok(fleet
            .hosts
            .iter()
            .filter(|h| {
                h.status == HostStatus::Running
                    && !h.user_host
                    && h.is_idle()
                    && !fleet.on_static_distro(h)
                    && h.idle_time(fleet.now) > cutoff
            })
            .map(FlaggedHost::terminate)
            .collect())
    }
}

/// System hosts above their distro's pool size.
///
/// The longest-idle hosts go first. If idle hosts do not cover the surplus,
/// the oldest busy hosts are decommissioned so they drain instead of being
/// killed mid-task.
pub struct ExcessHosts;

impl HostFlagger for ExcessHosts {
    fn name(&self) -> &'static str {
        "excess"
    }

    fn flag(&self, fleet: &FleetSnapshot<'_>) -> Result<Vec<FlaggedHost>> {
        let mut by_distro: BTreeMap<&str, Vec<&Host>> = BTreeMap::new();
        for host in fleet.hosts.iter().filter(|h| {
            !h.user_host
                && matches!(
                    h.status,
                    HostStatus::Unprovisioned | HostStatus::Provisioning | HostStatus::Running
                )
        }) {
            by_distro.entry(host.distro_id.as_str()).or_default().push(host);
        }

        let mut flagged = Vec::new();
        for (distro_id, hosts) in by_distro {
            let Some(distro) = fleet.distro(distro_id) else {
                continue;
            };
            if distro.is_static() || hosts.len() <= distro.pool_size {
                continue;
            }
            let mut surplus = hosts.len() - distro.pool_size;

            let (mut idle, mut busy): (Vec<&Host>, Vec<&Host>) = hosts
                .into_iter()
                .filter(|h| h.status == HostStatus::Running)
                .partition(|h| h.is_idle());
            idle.sort_by_key(|h| std::cmp::Reverse(h.idle_time(fleet.now)));
            busy.sort_by_key(|h| h.creation_time);

            for host in idle.into_iter().take(surplus) {
                flagged.push(FlaggedHost::terminate(host));
                surplus -= 1;
            }
            for host in busy.into_iter().take(surplus) {
                flagged.push(FlaggedHost::decommission(host));
            }
        }
        Ok(flagged)
    }
}

/// Hosts that never became ready within the provisioning cutoff.
pub struct UnprovisionedHosts;

impl HostFlagger for UnprovisionedHosts {
    fn name(&self) -> &'static str {
        "unprovisioned"
    }

    fn flag(&self, fleet: &FleetSnapshot<'_>) -> Result<Vec<FlaggedHost>> {
        let deadline = fleet.now - fleet.settings.provisioning_cutoff();
        Ok(fleet
            .hosts
            .iter()
            .filter(|h| {
                h.status.is_starting() && !fleet.on_static_distro(h) && h.creation_time < deadline
            })
            .map(FlaggedHost::terminate)
            .collect())
    }
}

/// Hosts whose setup reported failure.
pub struct ProvisionFailedHosts;

impl HostFlagger for ProvisionFailedHosts {
    fn name(&self) -> &'static str {
        "provision_failed"
    }

    fn flag(&self, fleet: &FleetSnapshot<'_>) -> Result<Vec<FlaggedHost>> {
        Ok(fleet
            .hosts
            .iter()
            .filter(|h| h.status == HostStatus::ProvisionFailed)
            .map(FlaggedHost::terminate)
            .collect())
    }
}

/// Spawn hosts past their expiration time.
pub struct ExpiredHosts;

impl HostFlagger for ExpiredHosts {
    fn name(&self) -> &'static str {
        "expired"
    }

    fn flag(&self, fleet: &FleetSnapshot<'_>) -> Result<Vec<FlaggedHost>> {
        Ok(fleet
            .hosts
            .iter()
            .filter(|h| {
                h.user_host
                    && !h.status.is_terminal()
                    && h.expiration_time.is_some_and(|t| t <= fleet.now)
            })
            .map(FlaggedHost::terminate)
            .collect())
    }
}
