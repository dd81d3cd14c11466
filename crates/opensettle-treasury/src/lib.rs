//! # opensettle-treasury
//!
//! **Treasury**: multi-signature fund movements between custody points,
//! additive risk scoring, hot/cold rebalancing, deposit pooling, the
//! emergency stop, and the capped audit trail.
//!
//! ## Operation lifecycle
//!
//! ```text
//! create → risk gate → PENDING → (N unique approvals) → APPROVED
//!        → adapter create/sign/broadcast → EXECUTED
//!   deny ↘ CANCELLED                      broadcast err ↘ FAILED
//! ```
//!
//! Operations with `required_signatures == 0` (rebalances, deposit pools)
//! execute at creation. The emergency stop fails every mutating entry
//! point fast; reads and the audit trail stay available.

pub mod audit;
pub mod engine;
pub mod loops;
pub mod pool;
pub mod rebalance;
pub mod report;
pub mod risk_engine;

pub use audit::AuditTrail;
pub use engine::{OperationRequest, TreasuryEngine};
pub use loops::{run_pool_loop, run_rebalance_loop, run_risk_eviction_loop};
pub use pool::{PoolQueue, pool_channel};
pub use report::TreasuryReport;
pub use risk_engine::RiskEngine;
