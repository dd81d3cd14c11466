//! # opensettle-types
//!
//! Shared types, errors, and configuration for the **OpenSettle**
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`DepositId`], [`WithdrawalId`], [`BatchId`], [`WalletId`], [`OperationId`], [`AuditId`], [`UserId`]
//! - **Deposit model**: [`Deposit`], [`DepositStatus`], [`CustodyPool`]
//! - **Withdrawal model**: [`Withdrawal`], [`WithdrawalStatus`], [`Priority`]
//! - **Batch model**: [`PaymentBatch`], [`BatchStatus`]
//! - **Treasury model**: [`TreasuryWallet`], [`TreasuryOperation`], [`WalletType`], [`WalletPurpose`], [`OperationType`], [`OperationStatus`]
//! - **Risk model**: [`RiskAssessment`], [`RiskFactor`], [`RiskLevel`], [`Recommendation`]
//! - **Audit model**: [`AuditEntry`]
//! - **Events**: [`SettleEvent`] on an in-process [`EventBus`]
//! - **Chain boundary**: [`ChainAdapter`], [`TxSighting`], [`AdapterRegistry`]
//! - **Configuration**: [`ChainPolicy`], [`FeeConfig`], [`DepositConfig`], [`WithdrawalConfig`], [`TreasuryConfig`]
//! - **Errors**: [`SettleError`] with `OS_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod audit;
pub mod batch;
pub mod chain;
pub mod config;
pub mod constants;
pub mod deposit;
pub mod error;
pub mod event;
pub mod ids;
pub mod metadata;
pub mod risk;
pub mod stats;
pub mod treasury;
pub mod withdrawal;

// Re-export all primary types at crate root for ergonomic imports:
//   use opensettle_types::{Deposit, Withdrawal, TreasuryOperation, ...};

pub use audit::*;
pub use batch::*;
pub use chain::*;
pub use config::*;
pub use deposit::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use metadata::*;
pub use risk::*;
pub use stats::*;
pub use treasury::*;
pub use withdrawal::*;

// Constants are accessed via `opensettle_types::constants::FOO`
// (not re-exported to avoid name collisions).
