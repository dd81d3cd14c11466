//! System-wide constants for the OpenSettle settlement engine.

/// Maximum audit trail entries retained (oldest evicted first).
pub const MAX_AUDIT_ENTRIES: usize = 10_000;

/// Risk assessment time-to-live in seconds (creation + 1 hour).
pub const RISK_ASSESSMENT_TTL_SECS: i64 = 3_600;

/// Default event bus capacity (per-subscriber ring; laggards drop oldest).
pub const DEFAULT_EVENT_CAPACITY: usize = 1_024;

/// Default deposit processing cycle interval in milliseconds.
pub const DEFAULT_DEPOSIT_POLL_MS: u64 = 5_000;

/// Default cooling-off delay between confirmation and credit, milliseconds.
pub const DEFAULT_PROCESSING_DELAY_MS: u64 = 30_000;

/// Default withdrawal queue processing interval in milliseconds.
pub const DEFAULT_WITHDRAWAL_POLL_MS: u64 = 10_000;

/// Default broadcast confirmation monitoring interval in milliseconds.
pub const DEFAULT_MONITOR_POLL_MS: u64 = 15_000;

/// Default treasury rebalance sweep interval in milliseconds.
pub const DEFAULT_REBALANCE_INTERVAL_MS: u64 = 300_000;

/// Default risk cache eviction sweep interval in milliseconds.
pub const DEFAULT_RISK_EVICT_INTERVAL_MS: u64 = 60_000;

/// Default maximum withdrawals grouped into one payment batch.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Default bound on concurrent adapter dispatches per cycle.
pub const DEFAULT_MAX_CONCURRENT_DISPATCHES: usize = 4;

/// Default number of signatures required on a treasury operation.
pub const DEFAULT_REQUIRED_SIGNATURES: u32 = 2;

/// Business hours used by the out-of-hours risk factor (local clock).
pub const BUSINESS_HOURS_START: u32 = 9;
pub const BUSINESS_HOURS_END: u32 = 17;

/// Risk score thresholds (summed factor scores, not clamped above 100).
pub const RISK_SCORE_CRITICAL: u32 = 70;
pub const RISK_SCORE_HIGH: u32 = 50;
pub const RISK_SCORE_MEDIUM: u32 = 30;

/// Individual risk factor contributions.
pub const RISK_FACTOR_OVER_CAP: u32 = 40;
pub const RISK_FACTOR_OVER_HALF_CAP: u32 = 20;
pub const RISK_FACTOR_BLACKLISTED: u32 = 40;
pub const RISK_FACTOR_NOT_WHITELISTED: u32 = 20;
pub const RISK_FACTOR_OUTSIDE_HOURS: u32 = 10;

/// Number of operations included in the treasury report's recent list.
pub const REPORT_RECENT_OPERATIONS: usize = 10;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "OpenSettle";
