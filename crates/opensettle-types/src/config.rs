//! Configuration types for OpenSettle pipelines and the treasury.

use chrono::{DateTime, Duration, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants;

/// Per-chain settlement policy. One entry per supported chain; there is no
/// universal confirmation count or minimum — everything is per chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainPolicy {
    /// Chain name (e.g., "ethereum").
    pub chain: String,
    /// Deposits below this amount fail immediately (chain-native units).
    pub min_deposit: Decimal,
    /// Confirmations required before a deposit is considered confirmed.
    pub confirmation_threshold: u32,
    /// Maximum single withdrawal amount.
    pub withdrawal_limit: Decimal,
    /// Flat fee used by the fixed strategy and as the dynamic fallback.
    pub fixed_fee: Decimal,
    /// Address withdrawals are paid out of.
    pub hot_wallet: String,
    /// Hours during which this chain's withdrawals are dispatched.
    pub window: ProcessingWindow,
}

impl ChainPolicy {
    /// Create a default Ethereum policy.
    #[must_use]
    pub fn ethereum() -> Self {
        Self {
            chain: "ethereum".to_string(),
            min_deposit: Decimal::new(1, 3),      // 0.001 ETH
            confirmation_threshold: 12,
            withdrawal_limit: Decimal::new(100, 0),
            fixed_fee: Decimal::new(2, 3),        // 0.002 ETH
            hot_wallet: "0xhot".to_string(),
            window: ProcessingWindow::always_open(),
        }
    }

    /// Create a default Bitcoin policy.
    #[must_use]
    pub fn bitcoin() -> Self {
        Self {
            chain: "bitcoin".to_string(),
            min_deposit: Decimal::new(1, 4),      // 0.0001 BTC
            confirmation_threshold: 6,
            withdrawal_limit: Decimal::new(10, 0),
            fixed_fee: Decimal::new(5, 4),        // 0.0005 BTC
            hot_wallet: "bc1hot".to_string(),
            window: ProcessingWindow::always_open(),
        }
    }
}

/// A daily processing window in local hours.
///
/// `start_hour == end_hour` means always open; `start_hour > end_hour`
/// wraps past midnight (e.g., 22..6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProcessingWindow {
    /// First hour (inclusive) of the window, 0-23.
    pub start_hour: u32,
    /// End hour (exclusive) of the window, 0-23.
    pub end_hour: u32,
    /// Offset from UTC applied before comparing hours.
    pub utc_offset_hours: i32,
}

impl ProcessingWindow {
    /// A window that never closes.
    #[must_use]
    pub fn always_open() -> Self {
        Self {
            start_hour: 0,
            end_hour: 0,
            utc_offset_hours: 0,
        }
    }

    /// Standard business hours (09:00-17:00) at the given UTC offset.
    #[must_use]
    pub fn business_hours(utc_offset_hours: i32) -> Self {
        Self {
            start_hour: constants::BUSINESS_HOURS_START,
            end_hour: constants::BUSINESS_HOURS_END,
            utc_offset_hours,
        }
    }

    /// Whether `now` falls inside the window.
    #[must_use]
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        if self.start_hour == self.end_hour {
            return true;
        }
        let local = now + Duration::hours(i64::from(self.utc_offset_hours));
        let hour = local.hour();
        if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl Default for ProcessingWindow {
    fn default() -> Self {
        Self::always_open()
    }
}

/// Fee computation strategy (see the fee calculator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeStrategy {
    /// The chain's configured flat fee.
    Fixed,
    /// `amount * percentage / 100`.
    Percentage,
    /// Live network fee data times a multiplier; flat fee on failure.
    Dynamic,
    /// `max(fixed, percentage)`.
    Hybrid,
}

/// Fee calculator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    pub strategy: FeeStrategy,
    /// Percentage applied by the percentage/hybrid strategies.
    pub percentage: Decimal,
    /// Multiplier applied to live fee data by the dynamic strategy.
    pub dynamic_multiplier: Decimal,
    /// Hard ceiling: fee never exceeds `amount * max_fee_percentage / 100`.
    pub max_fee_percentage: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            strategy: FeeStrategy::Fixed,
            percentage: Decimal::new(5, 1),         // 0.5%
            dynamic_multiplier: Decimal::new(12, 1), // 1.2x
            max_fee_percentage: Decimal::new(10, 0), // 10%
        }
    }
}

/// Deposit pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositConfig {
    /// Cooling-off delay between confirmation and credit, milliseconds.
    pub processing_delay_ms: u64,
    /// Deposit processing cycle interval, milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            processing_delay_ms: constants::DEFAULT_PROCESSING_DELAY_MS,
            poll_interval_ms: constants::DEFAULT_DEPOSIT_POLL_MS,
        }
    }
}

/// Withdrawal pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalConfig {
    /// Group same-(chain, token) withdrawals into payment batches.
    pub batching_enabled: bool,
    /// Maximum withdrawals per batch.
    pub batch_size: usize,
    /// Withdrawals at or above this amount are held for approval.
    pub large_amount_threshold: Decimal,
    /// Whether the large-amount approval gate is active.
    pub approval_required: bool,
    /// Bound on concurrent adapter dispatches per cycle.
    pub max_concurrent_dispatches: usize,
    /// Queue processing interval, milliseconds.
    pub poll_interval_ms: u64,
    /// Broadcast confirmation monitoring interval, milliseconds.
    pub monitor_interval_ms: u64,
    /// Accepted but never drives a retry loop: failed withdrawals stay
    /// failed for external reprocessing.
    pub max_retry_attempts: u32,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            batching_enabled: true,
            batch_size: constants::DEFAULT_BATCH_SIZE,
            large_amount_threshold: Decimal::ONE,
            approval_required: true,
            max_concurrent_dispatches: constants::DEFAULT_MAX_CONCURRENT_DISPATCHES,
            poll_interval_ms: constants::DEFAULT_WITHDRAWAL_POLL_MS,
            monitor_interval_ms: constants::DEFAULT_MONITOR_POLL_MS,
            max_retry_attempts: 3,
        }
    }
}

/// Risk scoring policy for treasury operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// Single-transaction cap; amounts above it score a high-severity factor.
    pub max_single_transaction: Decimal,
    /// Destinations that always score a high-severity factor.
    pub blacklist: Vec<String>,
    /// When set, destinations absent from the list score a medium factor.
    pub whitelist: Option<Vec<String>>,
    /// Business hours; execution outside them scores a low factor.
    pub business_hours: ProcessingWindow,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            max_single_transaction: Decimal::new(10, 0),
            blacklist: Vec::new(),
            whitelist: None,
            business_hours: ProcessingWindow::business_hours(0),
        }
    }
}

/// Treasury engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryConfig {
    /// Risk scoring policy.
    pub risk: RiskPolicy,
    /// Signatures required on operations that don't specify their own.
    pub default_required_signatures: u32,
    /// Rebalance sweep interval, milliseconds.
    pub rebalance_interval_ms: u64,
    /// Risk cache eviction sweep interval, milliseconds.
    pub risk_evict_interval_ms: u64,
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            risk: RiskPolicy::default(),
            default_required_signatures: constants::DEFAULT_REQUIRED_SIGNATURES,
            rebalance_interval_ms: constants::DEFAULT_REBALANCE_INTERVAL_MS,
            risk_evict_interval_ms: constants::DEFAULT_RISK_EVICT_INTERVAL_MS,
        }
    }
}
