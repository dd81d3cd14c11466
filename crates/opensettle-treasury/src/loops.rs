//! Periodic treasury tasks: rebalance sweeps, risk cache eviction, and
//! the deposit pooling drain. Each loop is independently cancellable via
//! a `watch` shutdown channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::MissedTickBehavior;

use opensettle_types::Deposit;

use crate::TreasuryEngine;

/// Run the hot/cold rebalance sweep on a fixed interval until `shutdown`
/// flips.
pub async fn run_rebalance_loop(
    engine: Arc<Mutex<TreasuryEngine>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let created = engine.lock().await.rebalance_sweep().await;
                if !created.is_empty() {
                    tracing::info!(swept = created.len(), "Rebalance sweep complete");
                }
            }
            _ = shutdown.changed() => {
                tracing::info!("Rebalance loop shutting down");
                break;
            }
        }
    }
}

/// Sweep expired risk assessments out of the cache on a fixed interval.
pub async fn run_risk_eviction_loop(
    engine: Arc<Mutex<TreasuryEngine>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.lock().await.evict_expired_assessments(Utc::now());
            }
            _ = shutdown.changed() => {
                tracing::info!("Risk eviction loop shutting down");
                break;
            }
        }
    }
}

/// Drain credited deposits from the pooling channel into custody until
/// the channel closes or `shutdown` flips. Pool failures are logged; the
/// deposit credit is never reverted.
pub async fn run_pool_loop(
    engine: Arc<Mutex<TreasuryEngine>>,
    mut deposits: mpsc::UnboundedReceiver<Deposit>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe = deposits.recv() => match maybe {
                Some(deposit) => {
                    if let Err(err) = engine.lock().await.pool_deposit(&deposit).await {
                        tracing::warn!(
                            deposit = %deposit.id,
                            error = %err,
                            "Pooling credited deposit failed"
                        );
                    }
                }
                None => {
                    tracing::info!("Pool channel closed; pool loop stopping");
                    break;
                }
            },
            _ = shutdown.changed() => {
                tracing::info!("Pool loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use opensettle_types::{
        AdapterRegistry, CustodyPool, EventBus, MemoryAdapter, OperationStatus, ProcessingWindow,
        RiskPolicy, TreasuryConfig, TreasuryWallet,
    };
    use rust_decimal::Decimal;

    use crate::pool::pool_channel;

    use super::*;

    fn engine() -> TreasuryEngine {
        let mut adapters = AdapterRegistry::new();
        adapters.register(Arc::new(MemoryAdapter::new("ethereum")));
        TreasuryEngine::new(
            TreasuryConfig {
                risk: RiskPolicy {
                    max_single_transaction: Decimal::new(1_000, 0),
                    business_hours: ProcessingWindow::always_open(),
                    ..RiskPolicy::default()
                },
                ..TreasuryConfig::default()
            },
            adapters,
            EventBus::new(64),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn pool_loop_drains_queue() {
        let mut eng = engine();
        eng.add_wallet(
            TreasuryWallet::dummy_hot("ethereum", "0xhot", Decimal::ZERO),
            "ops",
        )
        .unwrap();
        let engine = Arc::new(Mutex::new(eng));

        let (queue, rx) = pool_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_pool_loop(engine.clone(), rx, stop_rx));

        queue
            .request_pool(&opensettle_types::Deposit::dummy(
                "ethereum",
                Decimal::new(5, 1),
                12,
            ))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        let guard = engine.lock().await;
        let executed = guard.operations_by_status(OperationStatus::Executed);
        assert_eq!(executed.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rebalance_loop_sweeps_on_tick() {
        let mut eng = engine();
        let mut hot = TreasuryWallet::dummy_hot("ethereum", "0xhot", Decimal::new(100, 0));
        hot.threshold = Some(Decimal::new(50, 0));
        eng.add_wallet(hot, "ops").unwrap();
        eng.add_wallet(TreasuryWallet::dummy_cold("ethereum", "0xcold"), "ops")
            .unwrap();
        let engine = Arc::new(Mutex::new(eng));

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_rebalance_loop(
            engine.clone(),
            Duration::from_millis(10),
            stop_rx,
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        let guard = engine.lock().await;
        assert!(
            !guard
                .operations_by_status(OperationStatus::Executed)
                .is_empty()
        );
    }
}
