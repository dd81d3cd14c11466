//! Periodic deposit processing task.
//!
//! One independently cancellable loop per pipeline stage; shutdown is a
//! `watch` channel flip, so the host can stop loops individually.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;

use crate::DepositPipeline;

/// Run the deposit processing cycle on a fixed interval until `shutdown`
/// flips. Each tick is isolated: the cycle body cannot abort the loop.
pub async fn run_deposit_loop(
    pipeline: Arc<Mutex<DepositPipeline>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let credited = pipeline.lock().await.process_cycle(Utc::now());
                if credited > 0 {
                    tracing::debug!(credited, "Deposit cycle complete");
                }
            }
            _ = shutdown.changed() => {
                tracing::info!("Deposit loop shutting down");
                break;
            }
        }
    }
}
