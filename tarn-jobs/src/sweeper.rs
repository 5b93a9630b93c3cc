use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tarn_common::SystemContext;

use crate::model::JobPayload;
use crate::store::JobStore;

/// Runs `RecoverStale` on a fixed interval and `Purge` on a coarser one, for
/// a single queue. One instance exists per queue, mirroring `WorkerPool`'s
/// per-queue scoping; a process that owns several queues spawns one sweeper
/// per queue (see `tarn-worker`).
pub struct Sweeper<P: JobPayload> {
    store: Arc<JobStore<P>>,
    recover_interval: Duration,
    purge_interval: Duration,
    completed_ttl: Duration,
}

impl<P: JobPayload> Sweeper<P> {
    pub fn new(
        store: Arc<JobStore<P>>,
        recover_interval: Duration,
        purge_interval: Duration,
        completed_ttl: Duration,
    ) -> Self {
        Self {
            store,
            recover_interval,
            purge_interval,
            completed_ttl,
        }
    }

    /// Runs until `shutdown` fires. `RecoverStale` and `Purge` each run on
    /// their own cadence rather than lock-step, since purge is a cheap
    /// housekeeping pass that does not need the recovery sweep's tighter
    /// period.
    pub async fn run(&self, shutdown: CancellationToken) {
        let sys = SystemContext::sweeper();
        let mut recover_tick = tokio::time::interval(self.recover_interval);
        let mut purge_tick = tokio::time::interval(self.purge_interval);

        loop {
            tokio::select! {
                _ = recover_tick.tick() => {
                    match self.store.recover_stale(&sys).await {
                        Ok(n) if n > 0 => info!(queue = self.store.queue_name(), recovered = n, "sweeper recovered stale leases"),
                        Ok(_) => {}
                        Err(err) => error!(queue = self.store.queue_name(), %err, "sweeper recover_stale failed"),
                    }
                }
                _ = purge_tick.tick() => {
                    match self.store.purge(&sys, self.completed_ttl).await {
                        Ok(n) if n > 0 => info!(queue = self.store.queue_name(), purged = n, "sweeper purged completed jobs"),
                        Ok(_) => {}
                        Err(err) => error!(queue = self.store.queue_name(), %err, "sweeper purge failed"),
                    }
                }
                _ = shutdown.cancelled() => {
                    info!(queue = self.store.queue_name(), "sweeper shutting down");
                    break;
                }
            }
        }
    }
}
