//! Deposit pipeline state machine.
//!
//! The pipeline owns its deposit collection exclusively; no other component
//! mutates it. Processing re-evaluates only non-terminal deposits, so a
//! credited deposit can never be credited twice.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use opensettle_types::{
    ChainPolicy, CustodyPool, Deposit, DepositConfig, DepositId, DepositStats, DepositStatus,
    EventBus, META_FAILURE_REASON, Metadata, SettleEvent, TxDirection, TxSighting,
};

/// Consumes observer sightings and drives deposits to `credited`.
pub struct DepositPipeline {
    config: DepositConfig,
    /// Per-chain policy, keyed by chain name.
    policies: HashMap<String, ChainPolicy>,
    /// Owned collection, keyed by id.
    deposits: HashMap<DepositId, Deposit>,
    /// Dedup index: one deposit per observed tx hash.
    by_tx_hash: HashMap<String, DepositId>,
    events: EventBus,
    custody: Option<Arc<dyn CustodyPool>>,
}

impl DepositPipeline {
    #[must_use]
    pub fn new(config: DepositConfig, policies: Vec<ChainPolicy>, events: EventBus) -> Self {
        Self {
            config,
            policies: policies
                .into_iter()
                .map(|p| (p.chain.clone(), p))
                .collect(),
            deposits: HashMap::new(),
            by_tx_hash: HashMap::new(),
            events,
            custody: None,
        }
    }

    /// Attach the treasury pooling seam.
    #[must_use]
    pub fn with_custody_pool(mut self, custody: Arc<dyn CustodyPool>) -> Self {
        self.custody = Some(custody);
        self
    }

    /// Ingest one observer sighting. Outgoing sightings are ignored here
    /// (they feed withdrawal confirmation monitoring instead).
    ///
    /// A repeat sighting of a known tx hash updates confirmations
    /// monotonically; confirmations never decrease.
    pub fn observe(&mut self, sighting: &TxSighting) -> Option<DepositId> {
        if sighting.direction != TxDirection::Incoming {
            return None;
        }

        if let Some(&id) = self.by_tx_hash.get(&sighting.tx_hash) {
            if let Some(dep) = self.deposits.get_mut(&id) {
                if !dep.status.is_terminal() {
                    dep.confirmations = dep.confirmations.max(sighting.confirmations);
                    dep.block_height = dep.block_height.max(sighting.block_height);
                }
            }
            return Some(id);
        }

        let deposit = Deposit {
            id: DepositId::new(),
            user_id: sighting.user_id,
            wallet_address: sighting.to.clone(),
            chain: sighting.chain.clone(),
            amount: sighting.amount,
            token: sighting.token.clone(),
            token_symbol: sighting.token_symbol.clone(),
            tx_hash: sighting.tx_hash.clone(),
            block_height: sighting.block_height,
            confirmations: sighting.confirmations,
            status: DepositStatus::Detected,
            detected_at: sighting.seen_at,
            confirmed_at: None,
            credited_at: None,
            metadata: Metadata::new(),
        };
        let id = deposit.id;

        tracing::debug!(
            deposit = %id,
            chain = %deposit.chain,
            amount = %deposit.amount,
            tx_hash = %deposit.tx_hash,
            "Deposit detected"
        );
        self.events.emit(SettleEvent::DepositDetected {
            id,
            chain: deposit.chain.clone(),
            amount: deposit.amount,
        });

        self.by_tx_hash.insert(deposit.tx_hash.clone(), id);
        self.deposits.insert(id, deposit);
        Some(id)
    }

    /// One processing cycle: advance every non-terminal deposit, crediting
    /// those whose cooling-off window has elapsed. Returns the number of
    /// deposits credited this cycle.
    pub fn process_cycle(&mut self, now: DateTime<Utc>) -> usize {
        let delay = Duration::milliseconds(
            i64::try_from(self.config.processing_delay_ms).unwrap_or(i64::MAX),
        );
        let active: Vec<DepositId> = self
            .deposits
            .iter()
            .filter(|(_, d)| !d.status.is_terminal())
            .map(|(id, _)| *id)
            .collect();

        let mut credited = 0;
        for id in active {
            let Self {
                deposits,
                policies,
                events,
                custody,
                ..
            } = self;
            let Some(dep) = deposits.get_mut(&id) else {
                continue;
            };

            let Some(policy) = policies.get(&dep.chain) else {
                fail_deposit(dep, events, &format!("no policy for chain {}", dep.chain));
                continue;
            };

            // Amount floor applies regardless of confirmation state.
            if dep.amount < policy.min_deposit {
                fail_deposit(
                    dep,
                    events,
                    &format!(
                        "amount {} below chain minimum {}",
                        dep.amount, policy.min_deposit
                    ),
                );
                continue;
            }

            match dep.status {
                DepositStatus::Detected | DepositStatus::Confirming => {
                    if dep.confirmations >= policy.confirmation_threshold {
                        let prior = dep.status;
                        if dep.transition(prior, DepositStatus::Confirmed).is_ok() {
                            dep.confirmed_at = Some(now);
                            events.emit(SettleEvent::DepositConfirmed {
                                id,
                                confirmations: dep.confirmations,
                            });
                        }
                    } else if dep.status == DepositStatus::Detected
                        && dep
                            .transition(DepositStatus::Detected, DepositStatus::Confirming)
                            .is_ok()
                    {
                        events.emit(SettleEvent::DepositConfirming {
                            id,
                            confirmations: dep.confirmations,
                        });
                    }
                }
                _ => {}
            }

            // Cooling-off: credit only after the delay since confirmation.
            if dep.status == DepositStatus::Confirmed
                && dep.confirmed_at.is_some_and(|at| now - at >= delay)
                && dep
                    .transition(DepositStatus::Confirmed, DepositStatus::Credited)
                    .is_ok()
            {
                dep.credited_at = Some(now);
                credited += 1;
                tracing::info!(
                    deposit = %id,
                    chain = %dep.chain,
                    amount = %dep.amount,
                    "Deposit credited"
                );
                events.emit(SettleEvent::DepositCredited {
                    id,
                    amount: dep.amount,
                });

                // The credit is authoritative: a pool enqueue failure is
                // logged and the deposit stays credited.
                if let Some(pool) = custody {
                    if let Err(err) = pool.request_pool(dep) {
                        tracing::warn!(
                            deposit = %id,
                            error = %err,
                            "Pool request failed after credit"
                        );
                    }
                }
            }
        }
        credited
    }

    #[must_use]
    pub fn deposit(&self, id: DepositId) -> Option<&Deposit> {
        self.deposits.get(&id)
    }

    #[must_use]
    pub fn deposits_by_status(&self, status: DepositStatus) -> Vec<&Deposit> {
        self.deposits
            .values()
            .filter(|d| d.status == status)
            .collect()
    }

    /// Aggregate counts and credited total.
    #[must_use]
    pub fn stats(&self) -> DepositStats {
        let mut stats = DepositStats {
            total_count: self.deposits.len(),
            ..DepositStats::default()
        };
        for dep in self.deposits.values() {
            match dep.status {
                DepositStatus::Credited => {
                    stats.credited_count += 1;
                    stats.total_credited += dep.amount;
                }
                DepositStatus::Failed => stats.failed_count += 1,
                _ => {}
            }
        }
        stats
    }

    /// Configured processing cycle interval.
    #[must_use]
    pub fn poll_interval_ms(&self) -> u64 {
        self.config.poll_interval_ms
    }
}

/// Terminal failure from any pre-credit state, with the reason recorded in
/// metadata.
fn fail_deposit(dep: &mut Deposit, events: &EventBus, reason: &str) {
    tracing::warn!(deposit = %dep.id, reason, "Deposit failed");
    dep.status = DepositStatus::Failed;
    dep.metadata
        .insert(META_FAILURE_REASON.to_string(), reason.to_string());
    events.emit(SettleEvent::DepositFailed {
        id: dep.id,
        reason: reason.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use opensettle_types::{Result, SettleError, UserId};
    use rust_decimal::Decimal;

    use super::*;

    fn sighting(chain: &str, amount: Decimal, confirmations: u32, tx_hash: &str) -> TxSighting {
        TxSighting {
            wallet_id: "w1".to_string(),
            user_id: UserId::new(),
            tx_hash: tx_hash.to_string(),
            from: "0xsender".to_string(),
            to: "0xdeposit".to_string(),
            amount,
            block_height: 100,
            confirmations,
            chain: chain.to_string(),
            token: None,
            token_symbol: None,
            direction: TxDirection::Incoming,
            status: opensettle_types::TxSightingStatus::Pending,
            seen_at: Utc::now(),
        }
    }

    fn pipeline(delay_ms: u64) -> DepositPipeline {
        let config = DepositConfig {
            processing_delay_ms: delay_ms,
            poll_interval_ms: 1_000,
        };
        DepositPipeline::new(config, vec![ChainPolicy::ethereum()], EventBus::new(64))
    }

    struct RecordingPool {
        requests: Mutex<Vec<DepositId>>,
        fail: bool,
    }

    impl RecordingPool {
        fn new(fail: bool) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    impl CustodyPool for RecordingPool {
        fn request_pool(&self, deposit: &Deposit) -> Result<()> {
            if self.fail {
                return Err(SettleError::Internal("pool queue closed".into()));
            }
            self.requests.lock().unwrap().push(deposit.id);
            Ok(())
        }
    }

    #[test]
    fn detected_then_confirming_below_threshold() {
        let mut pl = pipeline(0);
        let id = pl
            .observe(&sighting("ethereum", Decimal::new(5, 2), 3, "0xaaa"))
            .unwrap();
        pl.process_cycle(Utc::now());
        assert_eq!(pl.deposit(id).unwrap().status, DepositStatus::Confirming);
    }

    #[test]
    fn confirmed_and_credited_in_one_cycle_with_zero_delay() {
        // 0.05 ETH at 12/12 confirmations, zero delay.
        let mut pl = pipeline(0);
        let id = pl
            .observe(&sighting("ethereum", Decimal::new(5, 2), 12, "0xaaa"))
            .unwrap();
        let credited = pl.process_cycle(Utc::now());
        assert_eq!(credited, 1);
        let dep = pl.deposit(id).unwrap();
        assert_eq!(dep.status, DepositStatus::Credited);
        assert!(dep.confirmed_at.is_some());
        assert!(dep.credited_at.is_some());
    }

    #[test]
    fn cooling_off_delay_holds_credit() {
        let mut pl = pipeline(60_000);
        let id = pl
            .observe(&sighting("ethereum", Decimal::new(5, 2), 12, "0xaaa"))
            .unwrap();
        let t0 = Utc::now();
        assert_eq!(pl.process_cycle(t0), 0);
        assert_eq!(pl.deposit(id).unwrap().status, DepositStatus::Confirmed);

        // Still inside the window.
        assert_eq!(pl.process_cycle(t0 + Duration::seconds(30)), 0);
        // Window elapsed.
        assert_eq!(pl.process_cycle(t0 + Duration::seconds(61)), 1);
        assert_eq!(pl.deposit(id).unwrap().status, DepositStatus::Credited);
    }

    #[test]
    fn below_minimum_fails_immediately() {
        // 0.0001 ETH against a 0.001 ETH floor.
        let mut pl = pipeline(0);
        let id = pl
            .observe(&sighting("ethereum", Decimal::new(1, 4), 12, "0xaaa"))
            .unwrap();
        pl.process_cycle(Utc::now());
        let dep = pl.deposit(id).unwrap();
        assert_eq!(dep.status, DepositStatus::Failed);
        assert!(dep.metadata.contains_key(META_FAILURE_REASON));
        assert!(dep.confirmed_at.is_none());
    }

    #[test]
    fn no_double_credit() {
        let mut pl = pipeline(0);
        let mut rx = {
            let bus = EventBus::new(64);
            let rx = bus.subscribe();
            pl.events = bus;
            rx
        };
        pl.observe(&sighting("ethereum", Decimal::new(5, 2), 12, "0xaaa"));
        let now = Utc::now();
        assert_eq!(pl.process_cycle(now), 1);
        assert_eq!(pl.process_cycle(now + Duration::seconds(1)), 0);
        assert_eq!(pl.process_cycle(now + Duration::seconds(2)), 0);

        let mut credited_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SettleEvent::DepositCredited { .. }) {
                credited_events += 1;
            }
        }
        assert_eq!(credited_events, 1);
    }

    #[test]
    fn repeat_sightings_update_confirmations_monotonically() {
        let mut pl = pipeline(0);
        let id = pl
            .observe(&sighting("ethereum", Decimal::new(5, 2), 3, "0xaaa"))
            .unwrap();
        // A lower confirmation count never regresses the deposit.
        pl.observe(&sighting("ethereum", Decimal::new(5, 2), 2, "0xaaa"));
        assert_eq!(pl.deposit(id).unwrap().confirmations, 3);
        pl.observe(&sighting("ethereum", Decimal::new(5, 2), 8, "0xaaa"));
        assert_eq!(pl.deposit(id).unwrap().confirmations, 8);
        // Still one deposit for the tx hash.
        assert_eq!(pl.stats().total_count, 1);
    }

    #[test]
    fn outgoing_sightings_are_ignored() {
        let mut pl = pipeline(0);
        let mut s = sighting("ethereum", Decimal::new(5, 2), 3, "0xaaa");
        s.direction = TxDirection::Outgoing;
        assert!(pl.observe(&s).is_none());
        assert_eq!(pl.stats().total_count, 0);
    }

    #[test]
    fn unknown_chain_fails_deposit() {
        let mut pl = pipeline(0);
        let id = pl
            .observe(&sighting("dogecoin", Decimal::new(5, 2), 3, "0xaaa"))
            .unwrap();
        pl.process_cycle(Utc::now());
        assert_eq!(pl.deposit(id).unwrap().status, DepositStatus::Failed);
    }

    #[test]
    fn credit_requests_pooling() {
        let pool = Arc::new(RecordingPool::new(false));
        let mut pl = pipeline(0).with_custody_pool(pool.clone());
        let id = pl
            .observe(&sighting("ethereum", Decimal::new(5, 2), 12, "0xaaa"))
            .unwrap();
        pl.process_cycle(Utc::now());
        assert_eq!(pool.requests.lock().unwrap().as_slice(), &[id]);
    }

    #[test]
    fn pool_failure_does_not_revert_credit() {
        let pool = Arc::new(RecordingPool::new(true));
        let mut pl = pipeline(0).with_custody_pool(pool);
        let id = pl
            .observe(&sighting("ethereum", Decimal::new(5, 2), 12, "0xaaa"))
            .unwrap();
        assert_eq!(pl.process_cycle(Utc::now()), 1);
        assert_eq!(pl.deposit(id).unwrap().status, DepositStatus::Credited);
    }

    #[test]
    fn stats_aggregate() {
        let mut pl = pipeline(0);
        pl.observe(&sighting("ethereum", Decimal::new(5, 2), 12, "0xaaa"));
        pl.observe(&sighting("ethereum", Decimal::new(1, 4), 0, "0xbbb"));
        pl.observe(&sighting("ethereum", Decimal::new(3, 2), 1, "0xccc"));
        pl.process_cycle(Utc::now());

        let stats = pl.stats();
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.credited_count, 1);
        assert_eq!(stats.failed_count, 1);
        assert_eq!(stats.total_credited, Decimal::new(5, 2));
    }
}
