//! Aggregate statistics across the settlement pipelines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Deposit pipeline aggregates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepositStats {
    pub total_count: usize,
    pub credited_count: usize,
    pub failed_count: usize,
    /// Sum of credited amounts.
    pub total_credited: Decimal,
}

/// Withdrawal pipeline aggregates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawalStats {
    pub total_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    /// Sum of all requested amounts.
    pub total_amount: Decimal,
    /// Sum of fees frozen at creation.
    pub total_fees: Decimal,
}

/// Payment batch aggregates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_count: usize,
    pub confirmed_count: usize,
    pub failed_count: usize,
}

/// Combined `getPaymentStats` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentStats {
    pub deposits: DepositStats,
    pub withdrawals: WithdrawalStats,
    pub batches: BatchStats,
}

impl PaymentStats {
    #[must_use]
    pub fn new(deposits: DepositStats, withdrawals: WithdrawalStats, batches: BatchStats) -> Self {
        Self {
            deposits,
            withdrawals,
            batches,
        }
    }

    /// Total fees collected across all withdrawals.
    #[must_use]
    pub fn total_fees(&self) -> Decimal {
        self.withdrawals.total_fees
    }
}
