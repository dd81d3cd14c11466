//! Batching: group eligible withdrawals by (chain, token).
//!
//! A group of two or more becomes one `PaymentBatch` per cycle, bounded by
//! the configured batch size — overflow stays queued for the next cycle.
//! Singleton groups are dispatched individually.

use chrono::{DateTime, Utc};
use opensettle_types::{BatchId, BatchStatus, PaymentBatch, Withdrawal, WithdrawalId};
use rust_decimal::Decimal;

/// Output of one planning pass over the eligible queue, in dispatch order.
#[derive(Debug, Default)]
pub struct BatchPlan {
    /// Each inner vec has >= 2 members sharing (chain, token).
    pub batches: Vec<Vec<WithdrawalId>>,
    /// Members of singleton groups, dispatched individually.
    pub singles: Vec<WithdrawalId>,
}

/// Partition `eligible` (already in priority/FIFO dispatch order) into
/// batches and singles. Group order follows first appearance, preserving
/// the dispatch ordering across groups.
#[must_use]
pub fn plan_batches(eligible: &[&Withdrawal], batch_size: usize) -> BatchPlan {
    let mut groups: Vec<((String, Option<String>), Vec<WithdrawalId>)> = Vec::new();
    for wd in eligible {
        let key = (wd.chain.clone(), wd.token.clone());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, ids)) => ids.push(wd.id),
            None => groups.push((key, vec![wd.id])),
        }
    }

    let mut plan = BatchPlan::default();
    for (_, mut ids) in groups {
        if ids.len() >= 2 {
            ids.truncate(batch_size.max(2));
            plan.batches.push(ids);
        } else {
            plan.singles.extend(ids);
        }
    }
    plan
}

/// Materialize a `PaymentBatch` from its members, summing amounts and fees.
///
/// Callers guarantee all members share (chain, token).
#[must_use]
pub fn build_batch(members: &[&Withdrawal], now: DateTime<Utc>) -> PaymentBatch {
    let total_amount: Decimal = members.iter().map(|w| w.amount).sum();
    let total_fee: Decimal = members.iter().map(|w| w.fee).sum();
    PaymentBatch {
        id: BatchId::new(),
        chain: members.first().map(|w| w.chain.clone()).unwrap_or_default(),
        token: members.first().and_then(|w| w.token.clone()),
        withdrawal_ids: members.iter().map(|w| w.id).collect(),
        total_amount,
        total_fee,
        status: BatchStatus::Created,
        tx_hash: None,
        created_at: now,
        processed_at: None,
    }
}
