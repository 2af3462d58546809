//! Periodic reclamation of hydrated content.

use crate::namespace::Namespace;
use crate::registry::HydrationRegistry;
use crate::vfs::CloudFs;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Registry entries taken into the sweep.
    pub examined: usize,
    /// Files turned back into placeholders.
    pub evicted: usize,
    /// Files still tracked as hydrated after the sweep.
    pub retained: usize,
    /// Entries whose slot vanished or was re-hydrated since recording.
    pub dropped: usize,
}

/// Evicts hydrated files that have been idle for too long.
#[derive(Debug)]
pub struct Sweeper {
    namespace: Arc<Namespace>,
    registry: Arc<HydrationRegistry>,
    stale_after: chrono::Duration,
    max_cached_files: usize,
}

impl Sweeper {
    pub fn new(
        namespace: Arc<Namespace>,
        registry: Arc<HydrationRegistry>,
        stale_after: Duration,
        max_cached_files: usize,
    ) -> Self {
        let secs = i64::try_from(stale_after.as_secs())
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000);

        Self {
            namespace,
            registry,
            stale_after: chrono::Duration::seconds(secs),
            max_cached_files,
        }
    }

    /// Run one sweep as of `now`.
    ///
    /// The registry is swapped out first, so hydrations completing during
    /// the sweep go into the fresh set. A file is evicted when its idle time,
    /// counted from the later of its hydration and its last access, exceeds
    /// the staleness threshold.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let snapshot = self.registry.take_snapshot();
        let mut report = SweepReport {
            examined: snapshot.len(),
            ..SweepReport::default()
        };

        let mut retained = Vec::with_capacity(snapshot.len());
        for (path, hydrated_at) in snapshot {
            let entry = match self.namespace.get(&path) {
                Some(entry) if entry.hydrated_at() == Some(hydrated_at) => entry,
                _ => {
                    debug!("Sweep: dropping {} (slot gone or re-hydrated)", path);
                    report.dropped += 1;
                    continue;
                }
            };

            let idle_since = hydrated_at.max(entry.last_access());
            if now.signed_duration_since(idle_since) > self.stale_after {
                if entry.evict_if_hydrated_at(hydrated_at) {
                    debug!("Sweep: evicted {}", path);
                    report.evicted += 1;
                } else {
                    report.dropped += 1;
                }
            } else {
                retained.push((path, hydrated_at));
            }
        }
        self.registry.restore(retained);

        report.evicted += self.enforce_capacity();
        report.retained = self.registry.len();

        if report.examined > 0 {
            info!(
                "Sweep: examined {}, evicted {}, retained {}, dropped {}",
                report.examined, report.evicted, report.retained, report.dropped
            );
        }
        report
    }

    /// Evict the least recently hydrated files above `max_cached_files`.
    fn enforce_capacity(&self) -> usize {
        if self.max_cached_files == 0 {
            return 0;
        }

        let paths = self.registry.paths();
        let surplus = paths.len().saturating_sub(self.max_cached_files);
        let mut evicted = 0;
        for path in paths.into_iter().take(surplus) {
            let Some(hydrated_at) = self.registry.remove(&path) else {
                continue;
            };
            let evicted_now = self
                .namespace
                .get(&path)
                .map(|entry| entry.evict_if_hydrated_at(hydrated_at))
                .unwrap_or(false);
            if evicted_now {
                debug!("Sweep: evicted {} (over capacity)", path);
                evicted += 1;
            }
        }
        evicted
    }
}

/// Handle of a running background sweeper.
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            error!("Sweeper task failed: {}", e);
        }
    }
}

/// Run `fs.sweep()` every `interval` on the current tokio runtime.
///
/// With `refresh_tree` set, every tick also rebuilds the remote tree on the
/// blocking pool. A failed rebuild keeps the previous namespace.
pub fn spawn(fs: CloudFs, interval: Duration, refresh_tree: bool) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let period = interval.max(Duration::from_millis(1));

    info!(
        "Sweeper started (every {:?}, refresh {})",
        period,
        if refresh_tree { "on" } else { "off" }
    );

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    fs.sweep(Utc::now());

                    if refresh_tree {
                        let refresh_fs = fs.clone();
                        match tokio::task::spawn_blocking(move || refresh_fs.refresh()).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => warn!("Tree refresh failed, keeping previous namespace: {}", e),
                            Err(e) => error!("Tree refresh task panicked: {}", e),
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    info!("Sweeper shutting down");
                    break;
                }
            }
        }
    });

    SweeperHandle {
        shutdown_tx: Some(shutdown_tx),
        task,
    }
}
