//! Deposit entity and lifecycle status.
//!
//! A deposit is created when the transaction observer reports an incoming
//! transaction, and is owned exclusively by the deposit pipeline. Once
//! `credited` or `failed` it is immutable except for metadata annotations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{DepositId, Metadata, Result, SettleError, UserId};

/// Lifecycle status of a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepositStatus {
    Detected,
    Confirming,
    Confirmed,
    Credited,
    Failed,
}

impl DepositStatus {
    /// Terminal states accept no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Credited | Self::Failed)
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detected => write!(f, "DETECTED"),
            Self::Confirming => write!(f, "CONFIRMING"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Credited => write!(f, "CREDITED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// An inbound transaction credited to a monitored address after
/// confirmation and a cooling-off window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub id: DepositId,
    pub user_id: UserId,
    pub wallet_address: String,
    pub chain: String,
    /// Amount in chain-native units.
    pub amount: Decimal,
    pub token: Option<String>,
    pub token_symbol: Option<String>,
    pub tx_hash: String,
    pub block_height: u64,
    /// Monotonically non-decreasing per tx hash until terminal.
    pub confirmations: u32,
    pub status: DepositStatus,
    pub detected_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub credited_at: Option<DateTime<Utc>>,
    pub metadata: Metadata,
}

impl Deposit {
    /// Compare-and-set status transition: only succeeds if the current
    /// status equals `expected`.
    pub fn transition(&mut self, expected: DepositStatus, next: DepositStatus) -> Result<()> {
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

/// Seam between the deposit pipeline and the treasury: on credit, the
/// pipeline asks for the deposited funds to be pooled toward custody.
/// Enqueue failure is logged by the caller and never reverts the credit.
pub trait CustodyPool: Send + Sync {
    fn request_pool(&self, deposit: &Deposit) -> Result<()>;
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Deposit {
    pub fn dummy(chain: &str, amount: Decimal, confirmations: u32) -> Self {
        Self {
            id: DepositId::new(),
            user_id: UserId::new(),
            wallet_address: "0xdeposit".to_string(),
            chain: chain.to_string(),
            amount,
            token: None,
            token_symbol: None,
            tx_hash: format!("0xtx{}", uuid::Uuid::now_v7().simple()),
            block_height: 100,
            confirmations,
            status: DepositStatus::Detected,
            detected_at: Utc::now(),
            confirmed_at: None,
            credited_at: None,
            metadata: Metadata::new(),
        }
    }
}
