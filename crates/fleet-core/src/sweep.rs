use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::fleet::Fleet;

/// Periodic liveness sweep. Runs beside the lanes; the per-cart locks keep
/// it from interleaving with a sample for the same cart.
pub struct Sweeper {
    stop: watch::Sender<bool>,
    handle: JoinHandle<u64>,
}

impl Sweeper {
    pub fn spawn(fleet: Arc<Fleet>) -> Self {
        let every = fleet.config().sweep_interval();
        let (stop, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut reported = 0u64;
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = tick.tick() => {
                        let events = fleet.sweep(OffsetDateTime::now_utc());
                        if !events.is_empty() {
                            debug!("sweep: {} carts went offline", events.len());
                        }
                        reported += events.len() as u64;
                    }
                }
            }
            reported
        });
        info!("sweep: every {:?}", every);
        Self { stop, handle }
    }

    /// Stops the task and returns how many carts it reported offline.
    pub async fn stop(self) -> u64 {
        let _ = self.stop.send(true);
        match self.handle.await {
            Ok(n) => n,
            Err(e) => {
                warn!("sweep: task failed: {}", e);
                0
            }
        }
    }
}
