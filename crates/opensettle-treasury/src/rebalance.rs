//! Automated hot/cold rebalancing.
//!
//! Hot wallets carry a drain threshold; when the observed balance exceeds
//! it, the excess above 80% of the threshold is swept to a same-chain cold
//! wallet. Sweep operations require zero signatures and execute
//! immediately.

use rust_decimal::Decimal;

use opensettle_types::{OperationId, OperationType, WalletType};

use crate::engine::{OperationRequest, TreasuryEngine};

/// Post-sweep target as a fraction of the threshold (0.8).
fn rebalance_target_ratio() -> Decimal {
    Decimal::new(8, 1)
}

impl TreasuryEngine {
    /// One rebalance pass over every hot wallet. Returns the ids of the
    /// sweep operations created. Per-wallet failures (risk denial, adapter
    /// errors) are logged and never abort the sweep.
    pub async fn rebalance_sweep(&mut self) -> Vec<OperationId> {
        if self.emergency_stop_active() {
            return Vec::new();
        }

        let mut plans: Vec<(String, String, String, Decimal)> = Vec::new();
        for wallet in self.wallets() {
            if wallet.wallet_type != WalletType::Hot {
                continue;
            }
            let Some(threshold) = wallet.threshold else {
                continue;
            };
            if wallet.balance <= threshold {
                continue;
            }
            let excess = wallet.balance - threshold * rebalance_target_ratio();
            let Some(cold) = self
                .wallets()
                .into_iter()
                .find(|w| w.wallet_type == WalletType::Cold && w.chain == wallet.chain)
            else {
                tracing::warn!(
                    wallet = %wallet.id,
                    chain = %wallet.chain,
                    "Hot wallet over threshold but no cold wallet on chain"
                );
                continue;
            };
            plans.push((
                wallet.address.clone(),
                cold.address.clone(),
                wallet.chain.clone(),
                excess,
            ));
        }

        let mut created = Vec::new();
        for (from, to, chain, excess) in plans {
            tracing::info!(from = %from, to = %to, amount = %excess, "Rebalancing hot wallet");
            match self
                .create_operation(OperationRequest {
                    op_type: OperationType::Rebalance,
                    from_wallet: from.clone(),
                    to_wallet: Some(to),
                    amount: excess,
                    token: None,
                    chain,
                    required_signatures: Some(0),
                    reason: "automatic hot wallet rebalance".to_string(),
                    requested_by: "rebalancer".to_string(),
                })
                .await
            {
                Ok(id) => created.push(id),
                Err(err) => {
                    tracing::warn!(from = %from, error = %err, "Rebalance sweep failed");
                }
            }
        }
        created
    }
}
