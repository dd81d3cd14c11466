//! # opensettle-payments
//!
//! **Payment Plane**: accepts withdrawal requests, freezes fees at
//! creation, gates large amounts behind approval, queues by priority,
//! groups same-(chain, token) withdrawals into payment batches, and drives
//! dispatch through broadcast to completion.
//!
//! ## Withdrawal flow
//!
//! ```text
//! create → [approval gate] → QUEUED → (window + priority/FIFO)
//!        → BATCHED | direct → PROCESSING → BROADCAST → COMPLETED
//!                      \_________\____________\→ FAILED (isolated)
//! ```
//!
//! Dispatch runs adapter calls inside a bounded-concurrency set with
//! per-item isolation: one failing broadcast never aborts its siblings,
//! but a failing batch fails every member (batch atomicity).

pub mod batcher;
pub mod fees;
pub mod loops;
pub mod pipeline;

pub use batcher::{BatchPlan, plan_batches};
pub use fees::FeeCalculator;
pub use loops::{run_monitor_loop, run_withdrawal_loop};
pub use pipeline::{WithdrawalPipeline, WithdrawalRequest};
