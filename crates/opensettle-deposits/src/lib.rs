//! # opensettle-deposits
//!
//! **Deposit Pipeline**: consumes transaction-observer sightings, advances
//! deposits through their lifecycle, and credits them after a policy-defined
//! confirmation count and cooling-off window.
//!
//! ## Lifecycle
//!
//! ```text
//! observer sighting → DETECTED → CONFIRMING → CONFIRMED → (delay) → CREDITED
//!                         \___________\____________\→ FAILED
//! ```
//!
//! On credit the pipeline asks the treasury (via [`CustodyPool`]) to pool
//! the funds toward custody; a pool enqueue failure is logged but never
//! reverts the credit — the credit is the authoritative event.
//!
//! [`CustodyPool`]: opensettle_types::CustodyPool

pub mod loops;
pub mod pipeline;

pub use loops::run_deposit_loop;
pub use pipeline::DepositPipeline;
