//! Error types for the OpenSettle settlement engine.
//!
//! All errors use the `OS_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Deposit errors
//! - 2xx: Withdrawal errors
//! - 3xx: Batch errors
//! - 4xx: Treasury / wallet errors
//! - 5xx: Risk errors
//! - 6xx: Chain adapter / execution errors
//! - 7xx: Policy errors (emergency stop)
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{BatchId, DepositId, OperationId, WalletId, WithdrawalId};

/// Central error enum for all OpenSettle operations.
#[derive(Debug, Error)]
pub enum SettleError {
    // =================================================================
    // Deposit Errors (1xx)
    // =================================================================
    /// The requested deposit was not found.
    #[error("OS_ERR_100: Deposit not found: {0}")]
    DepositNotFound(DepositId),

    /// The observed amount is below the chain's configured minimum.
    #[error("OS_ERR_101: Deposit below minimum on {chain}: {amount} < {minimum}")]
    BelowDepositMinimum {
        chain: String,
        amount: Decimal,
        minimum: Decimal,
    },

    // =================================================================
    // Withdrawal Errors (2xx)
    // =================================================================
    /// The requested withdrawal was not found.
    #[error("OS_ERR_200: Withdrawal not found: {0}")]
    WithdrawalNotFound(WithdrawalId),

    /// The withdrawal request failed validation (bad amount, missing fields).
    #[error("OS_ERR_201: Invalid withdrawal: {reason}")]
    InvalidWithdrawal { reason: String },

    /// The destination address failed adapter validation.
    #[error("OS_ERR_202: Invalid address on {chain}: {address}")]
    InvalidAddress { chain: String, address: String },

    /// The amount exceeds the per-chain withdrawal limit.
    #[error("OS_ERR_203: Withdrawal limit exceeded: {amount} > {limit}")]
    WithdrawalLimitExceeded { amount: Decimal, limit: Decimal },

    /// Approval was requested for a withdrawal not awaiting approval.
    #[error("OS_ERR_204: Withdrawal not awaiting approval: {0}")]
    NotAwaitingApproval(WithdrawalId),

    // =================================================================
    // Batch Errors (3xx)
    // =================================================================
    /// The requested payment batch was not found.
    #[error("OS_ERR_300: Batch not found: {0}")]
    BatchNotFound(BatchId),

    // =================================================================
    // Treasury / Wallet Errors (4xx)
    // =================================================================
    /// The requested treasury wallet was not found.
    #[error("OS_ERR_400: Treasury wallet not found: {0}")]
    WalletNotFound(WalletId),

    /// A wallet with non-zero balance cannot be removed.
    #[error("OS_ERR_401: Wallet not empty: balance {balance}")]
    WalletNotEmpty { balance: Decimal },

    /// The requested treasury operation was not found.
    #[error("OS_ERR_402: Operation not found: {0}")]
    OperationNotFound(OperationId),

    /// The operation is not in the `pending` state.
    #[error("OS_ERR_403: Operation not pending: {id} is {status}")]
    OperationNotPending { id: OperationId, status: String },

    /// The approver already signed this operation (no double counting).
    #[error("OS_ERR_404: Duplicate approval by {approver}")]
    DuplicateApproval { approver: String },

    /// The source wallet balance is insufficient for the operation.
    #[error("OS_ERR_405: Insufficient treasury balance: need {needed}, have {available}")]
    InsufficientTreasuryBalance { needed: Decimal, available: Decimal },

    /// The amount exceeds the single-transaction cap.
    #[error("OS_ERR_406: Amount {amount} exceeds single-transaction cap {cap}")]
    AmountExceedsCap { amount: Decimal, cap: Decimal },

    /// The source wallet for a non-pool operation is not registered.
    #[error("OS_ERR_407: Source wallet not registered: {address}")]
    SourceWalletUnknown { address: String },

    // =================================================================
    // Risk Errors (5xx)
    // =================================================================
    /// Risk assessment recommended denial — the operation is cancelled.
    #[error("OS_ERR_500: Operation denied by risk assessment (score {score})")]
    RiskDenied { score: u32 },

    // =================================================================
    // Chain Adapter / Execution Errors (6xx)
    // =================================================================
    /// No adapter is registered for this chain.
    #[error("OS_ERR_600: Unsupported chain: {0}")]
    UnsupportedChain(String),

    /// A chain adapter call failed (query, construction, signing).
    #[error("OS_ERR_601: Adapter failure on {chain}: {reason}")]
    AdapterFailure { chain: String, reason: String },

    /// Broadcasting a signed transaction failed.
    #[error("OS_ERR_602: Broadcast failed: {reason}")]
    BroadcastFailed { reason: String },

    // =================================================================
    // Policy Errors (7xx)
    // =================================================================
    /// The emergency stop is active — all mutating treasury actions fail fast.
    #[error("OS_ERR_700: Emergency stop active")]
    EmergencyStopActive,

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("OS_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("OS_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config, missing chain policy, etc.).
    #[error("OS_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// A compare-and-set status transition found an unexpected prior status.
    #[error("OS_ERR_903: Invalid status transition on {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// I/O error (disk, network).
    #[error("OS_ERR_904: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SettleError>;

// Conversion from std::io::Error
impl From<std::io::Error> for SettleError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
