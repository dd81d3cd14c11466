//! Payment batch: a grouping projection over withdrawals sharing a
//! (chain, token) pair, broadcast together to amortize fees.
//!
//! Batch lifecycle stays consistent with its members: batch failure
//! propagates to every constituent withdrawal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BatchId, Result, SettleError, WithdrawalId};

/// Lifecycle status of a payment batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    Created,
    Processing,
    Broadcast,
    Confirmed,
    Failed,
}

impl BatchStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Broadcast => write!(f, "BROADCAST"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A group of same-chain, same-token withdrawals broadcast as one
/// transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentBatch {
    pub id: BatchId,
    pub chain: String,
    pub token: Option<String>,
    /// Ordered member ids (dispatch order).
    pub withdrawal_ids: Vec<WithdrawalId>,
    /// Sum of member amounts.
    pub total_amount: Decimal,
    /// Sum of member fees.
    pub total_fee: Decimal,
    pub status: BatchStatus,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl PaymentBatch {
    /// Compare-and-set status transition: only succeeds if the current
    /// status equals `expected`.
    pub fn transition(&mut self, expected: BatchStatus, next: BatchStatus) -> Result<()> {
        if self.status != expected {
            return Err(SettleError::InvalidTransition {
                entity: self.id.to_string(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.withdrawal_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.withdrawal_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_batch() -> PaymentBatch {
        PaymentBatch {
            id: BatchId::new(),
            chain: "ethereum".to_string(),
            token: None,
            withdrawal_ids: vec![WithdrawalId::new(), WithdrawalId::new()],
            total_amount: Decimal::new(3, 0),
            total_fee: Decimal::new(1, 2),
            status: BatchStatus::Created,
            tx_hash: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    #[test]
    fn cas_transition() {
        let mut batch = make_batch();
        batch
            .transition(BatchStatus::Created, BatchStatus::Processing)
            .unwrap();
        assert_eq!(batch.status, BatchStatus::Processing);

        let err = batch
            .transition(BatchStatus::Created, BatchStatus::Broadcast)
            .unwrap_err();
        assert!(matches!(err, SettleError::InvalidTransition { .. }));
    }

    #[test]
    fn member_count() {
        let batch = make_batch();
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }
}
