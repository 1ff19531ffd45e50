//! Background maintenance task for a pool.
//!
//! Hosts that already have a scheduler can call `reload()` and `reclaim_expired()`
//! themselves. `PoolMaintenance` is the ready-made alternative: one tokio task that
//! ticks both on the intervals from `PoolConfig`. Running both from the same task keeps
//! them serial relative to each other, while sends keep flowing concurrently.
//!
//! ```ignore
//! let pool = Arc::new(pool);
//! pool.start().await;
//! let maintenance = PoolMaintenance::spawn(Arc::clone(&pool))?;
//!
//! // ... serve traffic ...
//!
//! maintenance.shutdown().await?;
//! pool.close().await;
//! ```

use crate::error::{Result, SinkError};
use crate::pool::ZoneProducerPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Handle to a running maintenance task.
#[derive(Debug)]
pub struct PoolMaintenance {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PoolMaintenance {
    /// Spawn the maintenance loop for `pool` on the current tokio runtime.
    ///
    /// The first reload happens one `reload_interval` after spawning; call
    /// `pool.start()` for the initial one.
    pub fn spawn(pool: Arc<ZoneProducerPool>) -> Result<Self> {
        let config = pool.config();
        if config.reload_interval.is_zero() || config.reclaim_interval.is_zero() {
            return Err(SinkError::Config(
                "reload_interval and reclaim_interval must be non-zero".to_string(),
            ));
        }
        let reload_interval = config.reload_interval;
        let reclaim_interval = config.reclaim_interval;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(pool, reload_interval, reclaim_interval, shutdown_rx));
        Ok(Self { shutdown, task })
    }

    /// Stop the loop and wait for the tick in progress, if any, to finish.
    pub async fn shutdown(self) -> Result<()> {
        if self.shutdown.send(true).is_err() {
            // receiver is gone: the loop already exited
            debug!("Pool maintenance task already stopped");
        }
        self.task.await?;
        Ok(())
    }
}

async fn run(
    pool: Arc<ZoneProducerPool>,
    reload_interval: Duration,
    reclaim_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let start = tokio::time::Instant::now();
    let mut reload = tokio::time::interval_at(start + reload_interval, reload_interval);
    reload.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut reclaim = tokio::time::interval_at(start + reclaim_interval, reclaim_interval);
    reclaim.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        pool = %pool.name(),
        reload_ms = reload_interval.as_millis() as u64,
        reclaim_ms = reclaim_interval.as_millis() as u64,
        "Pool maintenance started"
    );

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = reload.tick() => {
                debug!(pool = %pool.name(), "Scheduled reload");
                pool.reload().await;
            }
            _ = reclaim.tick() => {
                pool.reclaim_expired().await;
            }
        }
    }

    info!(pool = %pool.name(), "Pool maintenance stopped");
}
