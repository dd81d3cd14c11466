//! Treasury wallet and operation models.
//!
//! A treasury operation is a fund movement requiring N-of-M approval.
//! Wallets and operations are addressed by id; operation endpoints are
//! chain addresses, since pool operations originate from external deposit
//! addresses that are not treasury wallets.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Metadata, OperationId, Result, SettleError, WalletId};

/// Custody class of a treasury wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletType {
    Hot,
    Cold,
    Multisig,
}

impl std::fmt::Display for WalletType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hot => write!(f, "HOT"),
            Self::Cold => write!(f, "COLD"),
            Self::Multisig => write!(f, "MULTISIG"),
        }
    }
}

/// What the wallet is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletPurpose {
    Operational,
    Reserve,
    Distribution,
    Collection,
}

impl std::fmt::Display for WalletPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operational => write!(f, "OPERATIONAL"),
            Self::Reserve => write!(f, "RESERVE"),
            Self::Distribution => write!(f, "DISTRIBUTION"),
            Self::Collection => write!(f, "COLLECTION"),
        }
    }
}

/// A treasury-owned wallet. `balance` is the last observed value,
/// refreshed by an explicit poll sweep (stale reads are acceptable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryWallet {
    pub id: WalletId,
    pub address: String,
    pub chain: String,
    pub wallet_type: WalletType,
    pub purpose: WalletPurpose,
    pub balance: Decimal,
    /// Hot wallets above this balance are drained by the rebalancer.
    pub threshold: Option<Decimal>,
    pub signatories: Vec<String>,
    pub required_signatures: u32,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// The kind of fund movement an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Transfer,
    Pool,
    Distribute,
    Rebalance,
    Withdraw,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transfer => write!(f, "TRANSFER"),
            Self::Pool => write!(f, "POOL"),
            Self::Distribute => write!(f, "DISTRIBUTE"),
            Self::Rebalance => write!(f, "REBALANCE"),
            Self::Withdraw => write!(f, "WITHDRAW"),
        }
    }
}

/// Approval state machine of a treasury operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    Approved,
    Executed,
    Cancelled,
    Failed,
}

impl OperationStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Executed => write!(f, "EXECUTED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A fund movement between treasury custody points.
///
/// Invariants: `signatures` holds unique approver identities; execution
/// only occurs once `signatures.len() >= required_signatures`;
/// `required_signatures == 0` means auto-execution at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryOperation {
    pub id: OperationId,
    pub op_type: OperationType,
    pub status: OperationStatus,
    /// Source address. For pool operations this is the external deposit
    /// address; otherwise a registered treasury wallet address.
    pub from_wallet: String,
    /// Destination address, if the operation has one.
    pub to_wallet: Option<String>,
    pub amount: Decimal,
    pub token: Option<String>,
    pub chain: String,
    pub required_signatures: u32,
    /// Current unique approvals counting toward the threshold.
    pub signatures: Vec<String>,
    /// Full approval history for audit; may repeat identities over time.
    pub approved_by: Vec<String>,
    pub tx_hash: Option<String>,
    pub reason: String,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub metadata: Metadata,
}

impl TreasuryOperation {
    /// Compare-and-set status transition: only succeeds if the current
    /// status equals `expected`.
    pub fn transition(
        &mut self,
        expected: OperationStatus,
        next: OperationStatus,
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

    /// Whether the signature threshold has been met.
    #[must_use]
    pub fn fully_signed(&self) -> bool {
        self.signatures.len() >= self.required_signatures as usize
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl TreasuryWallet {
    pub fn dummy_hot(chain: &str, address: &str, balance: Decimal) -> Self {
        Self {
            id: WalletId::new(),
            address: address.to_string(),
            chain: chain.to_string(),
            wallet_type: WalletType::Hot,
            purpose: WalletPurpose::Operational,
            balance,
            threshold: None,
            signatories: Vec::new(),
            required_signatures: 0,
            label: format!("{chain} hot"),
            created_at: Utc::now(),
        }
    }

    pub fn dummy_cold(chain: &str, address: &str) -> Self {
        Self {
            id: WalletId::new(),
            address: address.to_string(),
            chain: chain.to_string(),
            wallet_type: WalletType::Cold,
            purpose: WalletPurpose::Reserve,
            balance: Decimal::ZERO,
            threshold: None,
            signatories: Vec::new(),
            required_signatures: 0,
            label: format!("{chain} cold"),
            created_at: Utc::now(),
        }
    }
}
