//! Withdrawal pipeline: validation, fee freeze, approval gate, priority
//! queue, batching, and bounded-concurrency dispatch.
//!
//! Dispatch is split into three phases so the pipeline lock is never held
//! across an adapter call:
//!   A. plan — mark entities processing and collect transaction requests;
//!   B. execute — run adapter create/sign/broadcast in a bounded join set;
//!   C. apply — record tx hashes or failures back onto the entities.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::task::JoinSet;

use opensettle_types::{
    AdapterRegistry, BatchId, BatchStats, BatchStatus, ChainAdapter, ChainPolicy, EventBus,
    FeeConfig, FeeStrategy, META_APPROVED_BY, META_ERROR, META_REQUIRES_APPROVAL, Metadata,
    PaymentBatch, Priority, Result, SettleError, SettleEvent, TransactionRequest, TxDirection,
    TxOutput, TxSighting, UserId, Withdrawal, WithdrawalConfig, WithdrawalId, WithdrawalStats,
    WithdrawalStatus,
};

use crate::batcher::{BatchPlan, build_batch, plan_batches};
use crate::fees::FeeCalculator;

/// Parameters for creating a withdrawal.
#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub user_id: UserId,
    pub destination: String,
    pub chain: String,
    pub amount: Decimal,
    pub token: Option<String>,
    pub token_symbol: Option<String>,
    pub priority: Priority,
    /// Earliest dispatch time; `None` means immediately eligible.
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// What a single dispatch drives: one withdrawal or one batch.
#[derive(Debug, Clone, Copy)]
enum DispatchTarget {
    Single(WithdrawalId),
    Batch(BatchId),
}

/// One planned adapter call, detached from the pipeline state.
struct Dispatch {
    target: DispatchTarget,
    adapter: Arc<dyn ChainAdapter>,
    request: TransactionRequest,
}

/// Owns all withdrawals and payment batches and drives them through the
/// dispatch lifecycle.
pub struct WithdrawalPipeline {
    config: WithdrawalConfig,
    policies: HashMap<String, ChainPolicy>,
    fees: FeeCalculator,
    adapters: AdapterRegistry,
    withdrawals: HashMap<WithdrawalId, Withdrawal>,
    batches: HashMap<BatchId, PaymentBatch>,
    /// Broadcast tx hash to the entity awaiting its confirmations.
    in_flight: HashMap<String, DispatchTarget>,
    events: EventBus,
}

impl WithdrawalPipeline {
    #[must_use]
    pub fn new(
        config: WithdrawalConfig,
        fee_config: FeeConfig,
        policies: Vec<ChainPolicy>,
        adapters: AdapterRegistry,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            policies: policies.into_iter().map(|p| (p.chain.clone(), p)).collect(),
            fees: FeeCalculator::new(fee_config),
            adapters,
            withdrawals: HashMap::new(),
            batches: HashMap::new(),
            in_flight: HashMap::new(),
            events,
        }
    }

    // -----------------------------------------------------------------
    // Creation and approval
    // -----------------------------------------------------------------

    /// Validate and register a withdrawal. The fee is computed here, once,
    /// and never recomputed. Large amounts are held `PENDING` behind the
    /// approval gate; everything else goes straight to `QUEUED`.
    pub async fn create_withdrawal(&mut self, request: WithdrawalRequest) -> Result<WithdrawalId> {
        if request.amount <= Decimal::ZERO {
            return Err(SettleError::InvalidWithdrawal {
                reason: format!("amount must be positive, got {}", request.amount),
            });
        }
        let policy = self
            .policies
            .get(&request.chain)
            .ok_or_else(|| SettleError::UnsupportedChain(request.chain.clone()))?
            .clone();
        if request.amount > policy.withdrawal_limit {
            return Err(SettleError::WithdrawalLimitExceeded {
                amount: request.amount,
                limit: policy.withdrawal_limit,
            });
        }

        let adapter = self.adapters.get(&request.chain)?;
        if !adapter.validate_address(&request.destination).await? {
            return Err(SettleError::InvalidAddress {
                chain: request.chain.clone(),
                address: request.destination.clone(),
            });
        }

        let fee_data = match self.fees.strategy() {
            FeeStrategy::Dynamic => adapter.fee_estimate().await.ok(),
            _ => None,
        };
        let fee = self.fees.calculate(&policy, request.amount, fee_data);

        let held = self.config.approval_required
            && request.amount >= self.config.large_amount_threshold;
        let mut metadata = Metadata::new();
        if held {
            metadata.insert(META_REQUIRES_APPROVAL.to_string(), "true".to_string());
        }

        let withdrawal = Withdrawal {
            id: WithdrawalId::new(),
            user_id: request.user_id,
            destination: request.destination,
            chain: request.chain,
            amount: request.amount,
            token: request.token,
            token_symbol: request.token_symbol,
            fee,
            status: if held {
                WithdrawalStatus::Pending
            } else {
                WithdrawalStatus::Queued
            },
            priority: request.priority,
            scheduled_for: request.scheduled_for,
            batch_id: None,
            tx_hash: None,
            created_at: Utc::now(),
            processed_at: None,
            completed_at: None,
            metadata,
        };

        let id = withdrawal.id;
        tracing::info!(
            withdrawal = %id,
            chain = %withdrawal.chain,
            amount = %withdrawal.amount,
            fee = %withdrawal.fee,
            held,
            "Withdrawal created"
        );
        self.events.emit(SettleEvent::WithdrawalCreated {
            id,
            chain: withdrawal.chain.clone(),
            amount: withdrawal.amount,
        });
        self.withdrawals.insert(id, withdrawal);
        Ok(id)
    }

    /// Release a held withdrawal into the queue, recording the approver.
    pub fn approve_withdrawal(&mut self, id: WithdrawalId, approver: &str) -> Result<()> {
        let withdrawal = self
            .withdrawals
            .get_mut(&id)
            .ok_or(SettleError::WithdrawalNotFound(id))?;
        if withdrawal.status != WithdrawalStatus::Pending {
            return Err(SettleError::NotAwaitingApproval(id));
        }
        withdrawal.transition(WithdrawalStatus::Pending, WithdrawalStatus::Queued)?;
        withdrawal
            .metadata
            .insert(META_APPROVED_BY.to_string(), approver.to_string());
        tracing::info!(withdrawal = %id, approver, "Withdrawal approved");
        self.events.emit(SettleEvent::WithdrawalApproved {
            id,
            approver: approver.to_string(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------
    // Queue processing
    // -----------------------------------------------------------------

    /// Queued withdrawals eligible for dispatch at `now`, ordered by
    /// priority (urgent first) and FIFO within a priority.
    #[must_use]
    pub fn eligible_queue(&self, now: DateTime<Utc>) -> Vec<&Withdrawal> {
        let mut eligible: Vec<&Withdrawal> = self
            .withdrawals
            .values()
            .filter(|w| w.status == WithdrawalStatus::Queued)
            .filter(|w| w.scheduled_for.is_none_or(|at| at <= now))
            .filter(|w| {
                self.policies
                    .get(&w.chain)
                    .is_some_and(|p| p.window.contains(now))
            })
            .collect();
        eligible.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        eligible
    }

    /// One queue processing cycle: plan, dispatch with bounded concurrency,
    /// apply outcomes. Returns the number of successful broadcasts.
    ///
    /// Failures are isolated per dispatch — one failed broadcast never
    /// aborts its siblings — except inside a batch, where the batch fails
    /// as a unit and every member fails with it.
    pub async fn process_queue(&mut self, now: DateTime<Utc>) -> usize {
        let plan = self.plan_cycle(now);
        let dispatches = self.prepare_dispatches(plan, now);
        if dispatches.is_empty() {
            return 0;
        }
        let results = Self::execute_dispatches(dispatches, self.config.max_concurrent_dispatches)
            .await;
        self.apply_results(results, now)
    }

    fn plan_cycle(&self, now: DateTime<Utc>) -> BatchPlan {
        let eligible = self.eligible_queue(now);
        if self.config.batching_enabled {
            plan_batches(&eligible, self.config.batch_size)
        } else {
            BatchPlan {
                batches: Vec::new(),
                singles: eligible.iter().map(|w| w.id).collect(),
            }
        }
    }

    /// Phase A: transition planned entities to `PROCESSING` and build the
    /// adapter requests. Entities on chains without an adapter fail here.
    fn prepare_dispatches(&mut self, plan: BatchPlan, now: DateTime<Utc>) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();

        for id in plan.singles {
            let Some(adapter) = self.adapter_or_fail_single(id) else {
                continue;
            };
            let Some(policy_wallet) = self
                .withdrawals
                .get(&id)
                .and_then(|w| self.policies.get(&w.chain))
                .map(|p| p.hot_wallet.clone())
            else {
                continue;
            };
            if let Some(wd) = self.withdrawals.get_mut(&id) {
                if let Err(err) = wd.transition(WithdrawalStatus::Queued, WithdrawalStatus::Processing)
                {
                    tracing::warn!(withdrawal = %id, error = %err, "Skipping dispatch");
                    continue;
                }
                wd.processed_at = Some(now);
                self.events.emit(SettleEvent::WithdrawalProcessing { id });
                dispatches.push(Dispatch {
                    target: DispatchTarget::Single(id),
                    adapter,
                    request: TransactionRequest {
                        chain: wd.chain.clone(),
                        from: policy_wallet,
                        outputs: vec![TxOutput {
                            address: wd.destination.clone(),
                            amount: wd.amount,
                        }],
                        token: wd.token.clone(),
                    },
                });
            }
        }

        for member_ids in plan.batches {
            let members: Vec<&Withdrawal> = member_ids
                .iter()
                .filter_map(|id| self.withdrawals.get(id))
                .collect();
            if members.len() < 2 {
                continue;
            }
            let batch = build_batch(&members, now);
            let chain = batch.chain.clone();
            let outputs: Vec<TxOutput> = members
                .iter()
                .map(|w| TxOutput {
                    address: w.destination.clone(),
                    amount: w.amount,
                })
                .collect();
            let token = batch.token.clone();
            let batch_id = batch.id;

            let Ok(adapter) = self.adapters.get(&chain) else {
                // No adapter: the members stay queued and the batch is
                // never registered.
                tracing::warn!(chain = %chain, "No adapter for batch chain");
                continue;
            };
            let Some(from) = self.policies.get(&chain).map(|p| p.hot_wallet.clone()) else {
                continue;
            };

            self.events.emit(SettleEvent::BatchCreated {
                id: batch_id,
                chain: chain.clone(),
                members: member_ids.len(),
            });
            let mut registered = batch;
            if registered
                .transition(BatchStatus::Created, BatchStatus::Processing)
                .is_ok()
            {
                self.events.emit(SettleEvent::BatchProcessing { id: batch_id });
            }
            for id in &member_ids {
                if let Some(wd) = self.withdrawals.get_mut(id) {
                    if wd
                        .transition(WithdrawalStatus::Queued, WithdrawalStatus::Batched)
                        .is_ok()
                    {
                        wd.batch_id = Some(batch_id);
                    }
                    if wd
                        .transition(WithdrawalStatus::Batched, WithdrawalStatus::Processing)
                        .is_ok()
                    {
                        wd.processed_at = Some(now);
                        self.events.emit(SettleEvent::WithdrawalProcessing { id: *id });
                    }
                }
            }
            self.batches.insert(batch_id, registered);

            dispatches.push(Dispatch {
                target: DispatchTarget::Batch(batch_id),
                adapter,
                request: TransactionRequest {
                    chain,
                    from,
                    outputs,
                    token,
                },
            });
        }

        dispatches
    }

    fn adapter_or_fail_single(&mut self, id: WithdrawalId) -> Option<Arc<dyn ChainAdapter>> {
        let chain = self.withdrawals.get(&id)?.chain.clone();
        match self.adapters.get(&chain) {
            Ok(adapter) => Some(adapter),
            Err(err) => {
                if let Some(wd) = self.withdrawals.get_mut(&id) {
                    fail_withdrawal(wd, &self.events, &err.to_string());
                }
                None
            }
        }
    }

    /// Phase B: run the adapter calls, at most `max_concurrent` in flight.
    async fn execute_dispatches(
        dispatches: Vec<Dispatch>,
        max_concurrent: usize,
    ) -> Vec<(DispatchTarget, Result<String>)> {
        let mut results = Vec::with_capacity(dispatches.len());
        let mut pending = dispatches.into_iter().peekable();
        let chunk = max_concurrent.max(1);

        while pending.peek().is_some() {
            let mut set = JoinSet::new();
            for dispatch in pending.by_ref().take(chunk) {
                set.spawn(async move {
                    let outcome = dispatch_via_adapter(&dispatch.adapter, &dispatch.request).await;
                    (dispatch.target, outcome)
                });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(err) => tracing::error!(error = %err, "Dispatch task panicked"),
                }
            }
        }
        results
    }

    /// Phase C: write tx hashes or failures back onto the entities.
    fn apply_results(
        &mut self,
        results: Vec<(DispatchTarget, Result<String>)>,
        now: DateTime<Utc>,
    ) -> usize {
        let mut broadcast = 0;
        for (target, outcome) in results {
            match (target, outcome) {
                (DispatchTarget::Single(id), Ok(tx_hash)) => {
                    if let Some(wd) = self.withdrawals.get_mut(&id) {
                        if wd
                            .transition(WithdrawalStatus::Processing, WithdrawalStatus::Broadcast)
                            .is_ok()
                        {
                            wd.tx_hash = Some(tx_hash.clone());
                            self.in_flight
                                .insert(tx_hash.clone(), DispatchTarget::Single(id));
                            self.events
                                .emit(SettleEvent::WithdrawalBroadcast { id, tx_hash });
                            broadcast += 1;
                        }
                    }
                }
                (DispatchTarget::Single(id), Err(err)) => {
                    tracing::warn!(
                        withdrawal = %id,
                        error = %err,
                        max_retry_attempts = self.config.max_retry_attempts,
                        "Dispatch failed; withdrawal held in FAILED for reprocessing"
                    );
                    if let Some(wd) = self.withdrawals.get_mut(&id) {
                        fail_withdrawal(wd, &self.events, &err.to_string());
                    }
                }
                (DispatchTarget::Batch(id), Ok(tx_hash)) => {
                    if let Some(batch) = self.batches.get_mut(&id) {
                        if batch
                            .transition(BatchStatus::Processing, BatchStatus::Broadcast)
                            .is_ok()
                        {
                            batch.tx_hash = Some(tx_hash.clone());
                            batch.processed_at = Some(now);
                            self.in_flight
                                .insert(tx_hash.clone(), DispatchTarget::Batch(id));
                            self.events.emit(SettleEvent::BatchBroadcast {
                                id,
                                tx_hash: tx_hash.clone(),
                            });
                            broadcast += 1;
                        }
                        for member in batch.withdrawal_ids.clone() {
                            if let Some(wd) = self.withdrawals.get_mut(&member) {
                                if wd
                                    .transition(
                                        WithdrawalStatus::Processing,
                                        WithdrawalStatus::Broadcast,
                                    )
                                    .is_ok()
                                {
                                    wd.tx_hash = Some(tx_hash.clone());
                                    self.events.emit(SettleEvent::WithdrawalBroadcast {
                                        id: member,
                                        tx_hash: tx_hash.clone(),
                                    });
                                }
                            }
                        }
                    }
                }
                (DispatchTarget::Batch(id), Err(err)) => {
                    self.fail_batch(id, &err.to_string());
                }
            }
        }
        broadcast
    }

    /// Fail a batch and, with it, every member (batch atomicity).
    fn fail_batch(&mut self, id: BatchId, reason: &str) {
        let Some(batch) = self.batches.get_mut(&id) else {
            return;
        };
        batch.status = BatchStatus::Failed;
        let members = batch.withdrawal_ids.clone();
        tracing::warn!(batch = %id, reason, members = members.len(), "Batch failed");
        self.events.emit(SettleEvent::BatchFailed {
            id,
            reason: reason.to_string(),
        });
        for member in members {
            if let Some(wd) = self.withdrawals.get_mut(&member) {
                fail_withdrawal(wd, &self.events, reason);
            }
        }
    }

    // -----------------------------------------------------------------
    // Confirmation monitoring
    // -----------------------------------------------------------------

    /// Feed an observer sighting into confirmation monitoring. Incoming
    /// sightings belong to the deposit pipeline and are ignored here.
    pub fn observe(&mut self, sighting: &TxSighting, now: DateTime<Utc>) {
        if sighting.direction != TxDirection::Outgoing {
            return;
        }
        self.record_confirmation(&sighting.tx_hash, sighting.confirmations, now);
    }

    /// Record a confirmation count for a broadcast tx hash. When the
    /// chain's threshold is met the withdrawal (or the whole batch)
    /// completes.
    pub fn record_confirmation(&mut self, tx_hash: &str, confirmations: u32, now: DateTime<Utc>) {
        let Some(&target) = self.in_flight.get(tx_hash) else {
            return;
        };
        let chain = match target {
            DispatchTarget::Single(id) => {
                self.withdrawals.get(&id).map(|w| w.chain.clone())
            }
            DispatchTarget::Batch(id) => self.batches.get(&id).map(|b| b.chain.clone()),
        };
        let Some(threshold) = chain
            .and_then(|c| self.policies.get(&c))
            .map(|p| p.confirmation_threshold)
        else {
            return;
        };
        if confirmations < threshold {
            return;
        }

        self.in_flight.remove(tx_hash);
        match target {
            DispatchTarget::Single(id) => self.complete_withdrawal(id, now),
            DispatchTarget::Batch(id) => {
                let members = match self.batches.get_mut(&id) {
                    Some(batch) => {
                        if batch
                            .transition(BatchStatus::Broadcast, BatchStatus::Confirmed)
                            .is_ok()
                        {
                            batch.withdrawal_ids.clone()
                        } else {
                            return;
                        }
                    }
                    None => return,
                };
                self.events.emit(SettleEvent::BatchCompleted { id });
                for member in members {
                    self.complete_withdrawal(member, now);
                }
            }
        }
    }

    fn complete_withdrawal(&mut self, id: WithdrawalId, now: DateTime<Utc>) {
        if let Some(wd) = self.withdrawals.get_mut(&id) {
            if wd
                .transition(WithdrawalStatus::Broadcast, WithdrawalStatus::Completed)
                .is_ok()
            {
                wd.completed_at = Some(now);
                tracing::info!(withdrawal = %id, "Withdrawal completed");
                self.events.emit(SettleEvent::WithdrawalCompleted { id });
            }
        }
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    #[must_use]
    pub fn withdrawal(&self, id: WithdrawalId) -> Option<&Withdrawal> {
        self.withdrawals.get(&id)
    }

    #[must_use]
    pub fn batch(&self, id: BatchId) -> Option<&PaymentBatch> {
        self.batches.get(&id)
    }

    #[must_use]
    pub fn withdrawals_by_status(&self, status: WithdrawalStatus) -> Vec<&Withdrawal> {
        self.withdrawals
            .values()
            .filter(|w| w.status == status)
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> (WithdrawalStats, BatchStats) {
        let mut wd = WithdrawalStats::default();
        for w in self.withdrawals.values() {
            wd.total_count += 1;
            wd.total_amount += w.amount;
            wd.total_fees += w.fee;
            match w.status {
                WithdrawalStatus::Completed => wd.completed_count += 1,
                WithdrawalStatus::Failed => wd.failed_count += 1,
                _ => {}
            }
        }
        let mut batches = BatchStats::default();
        for b in self.batches.values() {
            batches.total_count += 1;
            match b.status {
                BatchStatus::Confirmed => batches.confirmed_count += 1,
                BatchStatus::Failed => batches.failed_count += 1,
                _ => {}
            }
        }
        (wd, batches)
    }

    #[must_use]
    pub fn poll_interval_ms(&self) -> u64 {
        self.config.poll_interval_ms
    }

    #[must_use]
    pub fn monitor_interval_ms(&self) -> u64 {
        self.config.monitor_interval_ms
    }
}

/// Create, sign, and broadcast one transaction through an adapter.
async fn dispatch_via_adapter(
    adapter: &Arc<dyn ChainAdapter>,
    request: &TransactionRequest,
) -> Result<String> {
    let unsigned = adapter.create_transaction(request).await?;
    let signed = adapter.sign_transaction(unsigned).await?;
    adapter.broadcast_transaction(&signed).await
}

/// Mark a withdrawal failed, recording the reason. Failed withdrawals are
/// retained, never destroyed.
fn fail_withdrawal(withdrawal: &mut Withdrawal, events: &EventBus, reason: &str) {
    withdrawal.status = WithdrawalStatus::Failed;
    withdrawal
        .metadata
        .insert(META_ERROR.to_string(), reason.to_string());
    tracing::warn!(withdrawal = %withdrawal.id, reason, "Withdrawal failed");
    events.emit(SettleEvent::WithdrawalFailed {
        id: withdrawal.id,
        reason: reason.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use opensettle_types::{MemoryAdapter, ProcessingWindow};

    use super::*;

    fn registry(adapter: Arc<MemoryAdapter>) -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        registry.register(adapter);
        registry
    }

    fn pipeline_with(
        config: WithdrawalConfig,
        policies: Vec<ChainPolicy>,
        adapters: AdapterRegistry,
    ) -> WithdrawalPipeline {
        WithdrawalPipeline::new(
            config,
            FeeConfig::default(),
            policies,
            adapters,
            EventBus::new(256),
        )
    }

    fn request(chain: &str, amount: Decimal, priority: Priority) -> WithdrawalRequest {
        WithdrawalRequest {
            user_id: UserId::new(),
            destination: "0xdest".to_string(),
            chain: chain.to_string(),
            amount,
            token: None,
            token_symbol: None,
            priority,
            scheduled_for: None,
        }
    }

    fn no_approval() -> WithdrawalConfig {
        WithdrawalConfig {
            approval_required: false,
            ..WithdrawalConfig::default()
        }
    }

    #[tokio::test]
    async fn rejects_zero_amount() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut pipeline = pipeline_with(
            no_approval(),
            vec![ChainPolicy::ethereum()],
            registry(adapter),
        );
        let err = pipeline
            .create_withdrawal(request("ethereum", Decimal::ZERO, Priority::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, SettleError::InvalidWithdrawal { .. }));
    }

    #[tokio::test]
    async fn rejects_over_limit() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut pipeline = pipeline_with(
            no_approval(),
            vec![ChainPolicy::ethereum()],
            registry(adapter),
        );
        let err = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(101, 0), Priority::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, SettleError::WithdrawalLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn rejects_invalid_address() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        adapter.reject_address("0xdest");
        let mut pipeline = pipeline_with(
            no_approval(),
            vec![ChainPolicy::ethereum()],
            registry(adapter),
        );
        let err = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(5, 1), Priority::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, SettleError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn rejects_unknown_chain() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut pipeline = pipeline_with(
            no_approval(),
            vec![ChainPolicy::ethereum()],
            registry(adapter),
        );
        let err = pipeline
            .create_withdrawal(request("dogecoin", Decimal::ONE, Priority::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, SettleError::UnsupportedChain(_)));
    }

    #[tokio::test]
    async fn large_amount_held_for_approval() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut pipeline = pipeline_with(
            WithdrawalConfig::default(), // threshold 1, approval on
            vec![ChainPolicy::ethereum()],
            registry(adapter),
        );

        let id = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(5, 0), Priority::Normal))
            .await
            .unwrap();
        let wd = pipeline.withdrawal(id).unwrap();
        assert_eq!(wd.status, WithdrawalStatus::Pending);
        assert_eq!(
            wd.metadata.get(META_REQUIRES_APPROVAL).map(String::as_str),
            Some("true")
        );

        // Held withdrawals never dispatch.
        assert_eq!(pipeline.process_queue(Utc::now()).await, 0);

        pipeline.approve_withdrawal(id, "ops-lead").unwrap();
        let wd = pipeline.withdrawal(id).unwrap();
        assert_eq!(wd.status, WithdrawalStatus::Queued);
        assert_eq!(
            wd.metadata.get(META_APPROVED_BY).map(String::as_str),
            Some("ops-lead")
        );
    }

    #[tokio::test]
    async fn approving_queued_withdrawal_fails() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut pipeline = pipeline_with(
            no_approval(),
            vec![ChainPolicy::ethereum()],
            registry(adapter),
        );
        let id = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(5, 1), Priority::Normal))
            .await
            .unwrap();
        let err = pipeline.approve_withdrawal(id, "ops").unwrap_err();
        assert!(matches!(err, SettleError::NotAwaitingApproval(_)));
    }

    #[tokio::test]
    async fn fee_frozen_at_creation() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut pipeline = pipeline_with(
            no_approval(),
            vec![ChainPolicy::ethereum()],
            registry(adapter),
        );
        let id = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(5, 1), Priority::Normal))
            .await
            .unwrap();
        assert_eq!(
            pipeline.withdrawal(id).unwrap().fee,
            Decimal::new(2, 3) // fixed strategy: 0.002 ETH
        );
    }

    #[tokio::test]
    async fn priority_then_fifo_ordering() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut config = no_approval();
        config.batching_enabled = false;
        let mut pipeline =
            pipeline_with(config, vec![ChainPolicy::ethereum()], registry(adapter));

        let low = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(1, 1), Priority::Low))
            .await
            .unwrap();
        let urgent = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(2, 1), Priority::Urgent))
            .await
            .unwrap();
        let normal_a = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(3, 1), Priority::Normal))
            .await
            .unwrap();
        let normal_b = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(4, 1), Priority::Normal))
            .await
            .unwrap();

        let order: Vec<WithdrawalId> = pipeline
            .eligible_queue(Utc::now())
            .iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(order, vec![urgent, normal_a, normal_b, low]);
    }

    #[tokio::test]
    async fn single_dispatch_broadcasts_and_completes() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut config = no_approval();
        config.batching_enabled = false;
        let mut pipeline = pipeline_with(
            config,
            vec![ChainPolicy::ethereum()],
            registry(adapter.clone()),
        );

        let id = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(5, 1), Priority::Normal))
            .await
            .unwrap();
        assert_eq!(pipeline.process_queue(Utc::now()).await, 1);

        let wd = pipeline.withdrawal(id).unwrap();
        assert_eq!(wd.status, WithdrawalStatus::Broadcast);
        let tx_hash = wd.tx_hash.clone().unwrap();
        assert!(wd.processed_at.is_some());

        // Below threshold: still broadcast.
        pipeline.record_confirmation(&tx_hash, 3, Utc::now());
        assert_eq!(
            pipeline.withdrawal(id).unwrap().status,
            WithdrawalStatus::Broadcast
        );

        pipeline.record_confirmation(&tx_hash, 12, Utc::now());
        let wd = pipeline.withdrawal(id).unwrap();
        assert_eq!(wd.status, WithdrawalStatus::Completed);
        assert!(wd.completed_at.is_some());
    }

    #[tokio::test]
    async fn same_chain_pair_dispatches_as_one_batch() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut pipeline = pipeline_with(
            no_approval(),
            vec![ChainPolicy::ethereum()],
            registry(adapter.clone()),
        );

        let a = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(2, 1), Priority::Normal))
            .await
            .unwrap();
        let b = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(3, 1), Priority::Normal))
            .await
            .unwrap();

        assert_eq!(pipeline.process_queue(Utc::now()).await, 1);
        assert_eq!(adapter.broadcast_count(), 1);

        let wd_a = pipeline.withdrawal(a).unwrap();
        let wd_b = pipeline.withdrawal(b).unwrap();
        assert_eq!(wd_a.status, WithdrawalStatus::Broadcast);
        assert_eq!(wd_b.status, WithdrawalStatus::Broadcast);
        assert_eq!(wd_a.batch_id, wd_b.batch_id);
        assert_eq!(wd_a.tx_hash, wd_b.tx_hash);

        let batch = pipeline.batch(wd_a.batch_id.unwrap()).unwrap();
        assert_eq!(batch.status, BatchStatus::Broadcast);
        assert_eq!(batch.total_amount, Decimal::new(5, 1));

        // One confirmation completes the batch and every member.
        let tx_hash = wd_a.tx_hash.clone().unwrap();
        pipeline.record_confirmation(&tx_hash, 12, Utc::now());
        assert_eq!(
            pipeline.batch(pipeline.withdrawal(a).unwrap().batch_id.unwrap()).unwrap().status,
            BatchStatus::Confirmed
        );
        assert_eq!(
            pipeline.withdrawal(a).unwrap().status,
            WithdrawalStatus::Completed
        );
        assert_eq!(
            pipeline.withdrawal(b).unwrap().status,
            WithdrawalStatus::Completed
        );
    }

    #[tokio::test]
    async fn batch_failure_fails_every_member() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        adapter.set_fail_broadcast(true);
        let mut pipeline = pipeline_with(
            no_approval(),
            vec![ChainPolicy::ethereum()],
            registry(adapter),
        );

        let a = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(2, 1), Priority::Normal))
            .await
            .unwrap();
        let b = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(3, 1), Priority::Normal))
            .await
            .unwrap();

        assert_eq!(pipeline.process_queue(Utc::now()).await, 0);

        for id in [a, b] {
            let wd = pipeline.withdrawal(id).unwrap();
            assert_eq!(wd.status, WithdrawalStatus::Failed);
            assert!(wd.metadata.contains_key(META_ERROR));
        }
        let (_, batch_stats) = pipeline.stats();
        assert_eq!(batch_stats.failed_count, 1);
    }

    #[tokio::test]
    async fn failure_isolated_between_chains() {
        let eth = Arc::new(MemoryAdapter::new("ethereum"));
        let btc = Arc::new(MemoryAdapter::new("bitcoin"));
        btc.set_fail_broadcast(true);
        let mut adapters = AdapterRegistry::new();
        adapters.register(eth.clone());
        adapters.register(btc);

        let mut config = no_approval();
        config.batching_enabled = false;
        let mut pipeline = pipeline_with(
            config,
            vec![ChainPolicy::ethereum(), ChainPolicy::bitcoin()],
            adapters,
        );

        let ok = pipeline
            .create_withdrawal(request("ethereum", Decimal::new(5, 1), Priority::Normal))
            .await
            .unwrap();
        let mut btc_req = request("bitcoin", Decimal::new(1, 1), Priority::Normal);
        btc_req.destination = "bc1dest".to_string();
        let bad = pipeline.create_withdrawal(btc_req).await.unwrap();

        assert_eq!(pipeline.process_queue(Utc::now()).await, 1);
        assert_eq!(
            pipeline.withdrawal(ok).unwrap().status,
            WithdrawalStatus::Broadcast
        );
        assert_eq!(
            pipeline.withdrawal(bad).unwrap().status,
            WithdrawalStatus::Failed
        );
    }

    #[tokio::test]
    async fn scheduled_withdrawal_waits() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut config = no_approval();
        config.batching_enabled = false;
        let mut pipeline =
            pipeline_with(config, vec![ChainPolicy::ethereum()], registry(adapter));

        let mut req = request("ethereum", Decimal::new(5, 1), Priority::Normal);
        req.scheduled_for = Some(Utc::now() + chrono::Duration::hours(1));
        let id = pipeline.create_withdrawal(req).await.unwrap();

        assert_eq!(pipeline.process_queue(Utc::now()).await, 0);
        assert_eq!(
            pipeline.withdrawal(id).unwrap().status,
            WithdrawalStatus::Queued
        );

        let later = Utc::now() + chrono::Duration::hours(2);
        assert_eq!(pipeline.process_queue(later).await, 1);
    }

    #[tokio::test]
    async fn closed_window_blocks_dispatch() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut policy = ChainPolicy::ethereum();
        policy.window = ProcessingWindow::business_hours(0);
        let mut config = no_approval();
        config.batching_enabled = false;
        let mut pipeline = pipeline_with(config, vec![policy], registry(adapter));

        pipeline
            .create_withdrawal(request("ethereum", Decimal::new(5, 1), Priority::Normal))
            .await
            .unwrap();

        use chrono::TimeZone;
        let night = Utc.with_ymd_and_hms(2026, 3, 2, 22, 0, 0).unwrap();
        assert_eq!(pipeline.process_queue(night).await, 0);
        let midday = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        assert_eq!(pipeline.process_queue(midday).await, 1);
    }

    #[tokio::test]
    async fn batching_disabled_dispatches_individually() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut config = no_approval();
        config.batching_enabled = false;
        let mut pipeline = pipeline_with(
            config,
            vec![ChainPolicy::ethereum()],
            registry(adapter.clone()),
        );

        pipeline
            .create_withdrawal(request("ethereum", Decimal::new(2, 1), Priority::Normal))
            .await
            .unwrap();
        pipeline
            .create_withdrawal(request("ethereum", Decimal::new(3, 1), Priority::Normal))
            .await
            .unwrap();

        assert_eq!(pipeline.process_queue(Utc::now()).await, 2);
        assert_eq!(adapter.broadcast_count(), 2);
        assert!(pipeline.stats().1.total_count == 0);
    }

    #[tokio::test]
    async fn stats_aggregate_amounts_and_fees() {
        let adapter = Arc::new(MemoryAdapter::new("ethereum"));
        let mut config = no_approval();
        config.batching_enabled = false;
        let mut pipeline =
            pipeline_with(config, vec![ChainPolicy::ethereum()], registry(adapter));

        pipeline
            .create_withdrawal(request("ethereum", Decimal::new(2, 1), Priority::Normal))
            .await
            .unwrap();
        pipeline
            .create_withdrawal(request("ethereum", Decimal::new(3, 1), Priority::Normal))
            .await
            .unwrap();

        let (stats, _) = pipeline.stats();
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.total_amount, Decimal::new(5, 1));
        assert_eq!(stats.total_fees, Decimal::new(4, 3)); // 2 x 0.002
    }
}
