//! Point-in-time treasury snapshot for operators.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use opensettle_types::{TreasuryOperation, constants};

use crate::engine::TreasuryEngine;

/// Aggregated view over wallets and operations. Balances reflect the last
/// poll sweep, not live chain state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryReport {
    pub generated_at: DateTime<Utc>,
    pub emergency_stop: bool,
    pub total_wallets: usize,
    /// Wallet counts keyed by custody class (HOT, COLD, MULTISIG).
    pub wallets_by_type: BTreeMap<String, usize>,
    /// Summed last-observed balances per chain.
    pub balances_by_chain: BTreeMap<String, Decimal>,
    /// Operation counts keyed by status.
    pub operations_by_status: BTreeMap<String, usize>,
    /// The most recent operations, newest first.
    pub recent_operations: Vec<TreasuryOperation>,
}

impl TreasuryEngine {
    /// Build a report from current in-memory state.
    #[must_use]
    pub fn treasury_report(&self) -> TreasuryReport {
        let mut wallets_by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut balances_by_chain: BTreeMap<String, Decimal> = BTreeMap::new();
        let wallets = self.wallets();
        for wallet in &wallets {
            *wallets_by_type
                .entry(wallet.wallet_type.to_string())
                .or_default() += 1;
            *balances_by_chain
                .entry(wallet.chain.clone())
                .or_default() += wallet.balance;
        }

        let mut operations_by_status: BTreeMap<String, usize> = BTreeMap::new();
        let mut recent: Vec<&TreasuryOperation> = self.operations();
        for op in &recent {
            *operations_by_status.entry(op.status.to_string()).or_default() += 1;
        }
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        recent.truncate(constants::REPORT_RECENT_OPERATIONS);

        TreasuryReport {
            generated_at: Utc::now(),
            emergency_stop: self.emergency_stop_active(),
            total_wallets: wallets.len(),
            wallets_by_type,
            balances_by_chain,
            operations_by_status,
            recent_operations: recent.into_iter().cloned().collect(),
        }
    }
}
