use insight_core::InsightEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Background task: drops expired insights that were never read again.
pub struct CacheSweeper {
    engine: Arc<InsightEngine>,
    interval: Duration,
}

impl CacheSweeper {
    pub fn new(engine: Arc<InsightEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// One pass over the cache. Returns the number of entries removed.
    pub fn sweep_once(&self) -> usize {
        let removed = self.engine.cache().purge_expired();
        if removed > 0 {
            debug!(removed, remaining = self.engine.cache().len(), "cache sweep");
        }
        removed
    }

    /// Run until `shutdown` flips to `true`. Call via `tokio::spawn`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "Cache sweeper started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Cache sweeper shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep_once();
                }
            }
        }
    }
}
