//! Withdrawal entity, priority, and lifecycle status.
//!
//! Withdrawals are append-only ledger entries: failed and completed ones
//! are retained for audit, never destroyed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BatchId, Metadata, Result, SettleError, UserId, WithdrawalId};

/// Dispatch priority. Declaration order gives `Low < Normal < High < Urgent`
/// so `Ord` sorts ascending by urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Normal => write!(f, "NORMAL"),
            Self::High => write!(f, "HIGH"),
            Self::Urgent => write!(f, "URGENT"),
        }
    }
}

/// Lifecycle status of a withdrawal.
///
/// `Pending` sits behind the large-amount approval gate; everything else
/// follows the dispatch path. `Failed` is reachable from any non-terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    Pending,
    Queued,
    Batched,
    Processing,
    Broadcast,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Queued => write!(f, "QUEUED"),
            Self::Batched => write!(f, "BATCHED"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Broadcast => write!(f, "BROADCAST"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// An outbound payment request processed and broadcast on behalf of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub destination: String,
    pub chain: String,
    pub amount: Decimal,
    pub token: Option<String>,
    pub token_symbol: Option<String>,
    /// Computed once at creation and never recomputed.
    pub fee: Decimal,
    pub status: WithdrawalStatus,
    pub priority: Priority,
    /// Not dispatched before this time.
    pub scheduled_for: Option<DateTime<Utc>>,
    pub batch_id: Option<BatchId>,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: Metadata,
}

impl Withdrawal {
    /// Compare-and-set status transition: only succeeds if the current
    /// status equals `expected`.
    pub fn transition(
        &mut self,
        expected: WithdrawalStatus,
        next: WithdrawalStatus,
    ) -> Result<()> {
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
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Withdrawal {
    pub fn dummy(chain: &str, amount: Decimal, priority: Priority) -> Self {
        Self {
            id: WithdrawalId::new(),
            user_id: UserId::new(),
            destination: "0xdest".to_string(),
            chain: chain.to_string(),
            amount,
            token: None,
            token_symbol: None,
            fee: Decimal::ZERO,
            status: WithdrawalStatus::Queued,
            priority,
            scheduled_for: None,
            batch_id: None,
            tx_hash: None,
            created_at: Utc::now(),
            processed_at: None,
            completed_at: None,
            metadata: Metadata::new(),
        }
    }
}
