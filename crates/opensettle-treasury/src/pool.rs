//! Deposit pooling: moving credited deposits from their external deposit
//! addresses into treasury custody.
//!
//! The deposit pipeline hands credited deposits over through the
//! [`CustodyPool`] seam; the treasury drains the queue and creates
//! zero-signature pool operations targeting a collection wallet.

use tokio::sync::mpsc;

use opensettle_types::{
    CustodyPool, Deposit, OperationId, OperationType, Result, SettleError, WalletPurpose,
    WalletType,
};

use crate::engine::{OperationRequest, TreasuryEngine};

/// Sending half of the pooling seam, handed to the deposit pipeline.
#[derive(Debug, Clone)]
pub struct PoolQueue {
    tx: mpsc::UnboundedSender<Deposit>,
}

impl CustodyPool for PoolQueue {
    fn request_pool(&self, deposit: &Deposit) -> Result<()> {
        self.tx
            .send(deposit.clone())
            .map_err(|_| SettleError::Internal("custody pool channel closed".to_string()))
    }
}

/// Create the pooling channel: the `PoolQueue` goes to the deposit
/// pipeline, the receiver to [`crate::loops::run_pool_loop`].
#[must_use]
pub fn pool_channel() -> (PoolQueue, mpsc::UnboundedReceiver<Deposit>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PoolQueue { tx }, rx)
}

impl TreasuryEngine {
    /// Pool one credited deposit into custody. Routes to a same-chain
    /// collection wallet, falling back to any same-chain hot wallet; with
    /// neither, the request is dropped with a warning.
    pub async fn pool_deposit(&mut self, deposit: &Deposit) -> Result<Option<OperationId>> {
        let destination = self
            .wallets()
            .into_iter()
            .find(|w| w.chain == deposit.chain && w.purpose == WalletPurpose::Collection)
            .or_else(|| {
                self.wallets()
                    .into_iter()
                    .find(|w| w.chain == deposit.chain && w.wallet_type == WalletType::Hot)
            })
            .map(|w| w.address.clone());
        let Some(destination) = destination else {
            tracing::warn!(
                deposit = %deposit.id,
                chain = %deposit.chain,
                "No custody wallet on chain; pool request dropped"
            );
            return Ok(None);
        };

        let id = self
            .create_operation(OperationRequest {
                op_type: OperationType::Pool,
                from_wallet: deposit.wallet_address.clone(),
                to_wallet: Some(destination),
                amount: deposit.amount,
                token: deposit.token.clone(),
                chain: deposit.chain.clone(),
                required_signatures: Some(0),
                reason: format!("pool deposit {}", deposit.id),
                requested_by: "deposit-pipeline".to_string(),
            })
            .await?;
        Ok(Some(id))
    }
}
