//! Periodic withdrawal tasks: queue processing and confirmation
//! monitoring. Each loop is independently cancellable via a `watch`
//! shutdown channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::MissedTickBehavior;

use opensettle_types::TxSighting;

use crate::WithdrawalPipeline;

/// Run the withdrawal queue processing cycle on a fixed interval until
/// `shutdown` flips.
pub async fn run_withdrawal_loop(
    pipeline: Arc<Mutex<WithdrawalPipeline>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let dispatched = pipeline.lock().await.process_queue(Utc::now()).await;
                if dispatched > 0 {
                    tracing::debug!(dispatched, "Withdrawal cycle complete");
                }
            }
            _ = shutdown.changed() => {
                tracing::info!("Withdrawal loop shutting down");
                break;
            }
        }
    }
}

/// Feed observer sightings into confirmation monitoring until the sighting
/// channel closes or `shutdown` flips.
pub async fn run_monitor_loop(
    pipeline: Arc<Mutex<WithdrawalPipeline>>,
    mut sightings: mpsc::UnboundedReceiver<TxSighting>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe = sightings.recv() => match maybe {
                Some(sighting) => {
                    pipeline.lock().await.observe(&sighting, Utc::now());
                }
                None => {
                    tracing::info!("Sighting channel closed; monitor loop stopping");
                    break;
                }
            },
            _ = shutdown.changed() => {
                tracing::info!("Monitor loop shutting down");
                break;
            }
        }
    }
}
