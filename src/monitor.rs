//! Fleet flagging and cleanup.
//!
//! A monitoring run evaluates independent policies against the current
//! fleet and applies corrective actions:
//!
//! - [`TaskMonitor`]: fails (or requeues) tasks that stopped heartbeating.
//! - [`HostMonitor`]: terminates or decommissions flagged hosts, then runs
//!   non-terminating checks such as reachability.
//! - [`Notifier`]: warns spawn host owners and admins.
//!
//! Policies are pure selectors over a [`FleetSnapshot`]; the monitors own
//! every side effect. Nothing short of failing to load distros or project
//! refs stops a run: per-item failures are collected and returned.

pub mod checks;
pub mod host_flags;
pub mod host_monitor;
pub mod notifications;
pub mod notifier;
pub mod orchestrator;
pub mod task_flags;
pub mod task_monitor;

pub use checks::{HostCheck, Reachability};
pub use host_flags::{FlaggedHost, HostFlagger};
pub use host_monitor::HostMonitor;
pub use notifications::NotificationBuilder;
pub use notifier::Notifier;
pub use orchestrator::{Policies, RunSummary, run_all_monitoring, run_with_policies};
pub use task_flags::{TaskFlagger, TaskSnapshot};
pub use task_monitor::TaskMonitor;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::MonitorSettings;
use crate::error::{Error, Result};
use crate::model::{Distro, Host};

/// Read-only view of the fleet handed to host policies.
#[derive(Debug, Clone, Copy)]
pub struct FleetSnapshot<'a> {
    pub hosts: &'a [Host],
    pub distros: &'a [Distro],
    pub settings: &'a MonitorSettings,
    pub now: DateTime<Utc>,
}

impl<'a> FleetSnapshot<'a> {
    pub fn distro(&self, id: &str) -> Option<&'a Distro> {
        self.distros.iter().find(|d| d.id == id)
    }

    /// Hosts on static distros are hand-managed and never reclaimed.
    pub fn on_static_distro(&self, host: &Host) -> bool {
        self.distro(&host.distro_id).is_some_and(Distro::is_static)
    }
}

/// Run `action` on every item, at most `limit` at a time, and collect the
/// failures. One item failing (or panicking) never stops the others.
pub(crate) async fn run_isolated<T, F, Fut>(items: Vec<T>, limit: usize, action: F) -> Vec<Error>
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();

    for item in items {
        let permits = Arc::clone(&permits);
        let fut = action(item);
        set.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| Error::Other(format!("cleanup limiter closed: {e}")))?;
            fut.await
        });
    }

    let mut errors = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.push(e),
            Err(e) => errors.push(Error::Other(format!("cleanup action aborted: {e}"))),
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn run_isolated_collects_only_failures() {
        let done = Arc::new(AtomicUsize::new(0));
        let errors = run_isolated((0..10).collect(), 3, |i: usize| {
            let done = Arc::clone(&done);
            async move {
                if i == 4 {
                    return Err(Error::Other("item 4".to_string()));
                }
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "item 4");
        assert_eq!(done.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn run_isolated_survives_a_panicking_item() {
        let errors = run_isolated(vec![1, 2, 3], 2, |i: u32| async move {
            if i == 2 {
                panic!("boom");
            }
            Ok::<(), Error>(())
        })
        .await;
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn run_isolated_with_nothing_to_do() {
        let errors = run_isolated(Vec::<u8>::new(), 4, |_| async { Ok::<(), Error>(()) }).await;
        assert!(errors.is_empty());
    }
}
