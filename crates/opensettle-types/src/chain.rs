//! Chain adapter boundary and transaction observer events.
//!
//! Per-chain protocol plumbing (address generation, UTXO/balance queries,
//! transaction construction, signing, broadcast) lives behind the
//! [`ChainAdapter`] trait. The settlement engine never produces signatures
//! itself and never assumes a chain's internals.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Result, SettleError, UserId};

/// Balance snapshot for one address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub balance: Decimal,
    pub confirmed: Decimal,
    pub unconfirmed: Decimal,
    pub block_height: u64,
}

/// One payment output of a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    pub amount: Decimal,
}

/// A request to construct an outbound transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub chain: String,
    pub from: String,
    pub outputs: Vec<TxOutput>,
    pub token: Option<String>,
}

impl TransactionRequest {
    #[must_use]
    pub fn total_amount(&self) -> Decimal {
        self.outputs.iter().map(|o| o.amount).sum()
    }
}

/// A constructed but unsigned transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub request: TransactionRequest,
    pub estimated_fee: Decimal,
}

/// A signed transaction ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub unsigned: UnsignedTransaction,
    /// Opaque signature blob produced by the adapter.
    pub signature: String,
}

/// Per-chain capability consumed by the pipelines and the treasury.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Chain this adapter serves (e.g., "ethereum").
    fn chain_name(&self) -> &str;

    /// Decimal places of the native token.
    fn native_decimals(&self) -> u32;

    /// Chain-recommended confirmation count.
    fn confirmation_threshold(&self) -> u32;

    /// Whether `address` is well-formed for this chain.
    async fn validate_address(&self, address: &str) -> Result<bool>;

    /// Current balance of `address`.
    async fn get_balance(&self, address: &str) -> Result<BalanceSnapshot>;

    /// Live network fee estimate in native units. Errors when the chain
    /// exposes no fee market or the query fails.
    async fn fee_estimate(&self) -> Result<Decimal>;

    /// Construct an unsigned transaction.
    async fn create_transaction(&self, request: &TransactionRequest)
    -> Result<UnsignedTransaction>;

    /// Sign a transaction. Key custody is entirely the adapter's concern.
    async fn sign_transaction(&self, unsigned: UnsignedTransaction) -> Result<SignedTransaction>;

    /// Broadcast a signed transaction, returning the transaction hash.
    async fn broadcast_transaction(&self, signed: &SignedTransaction) -> Result<String>;
}

/// Direction of an observed transaction relative to the watched address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxDirection {
    Incoming,
    Outgoing,
}

/// Observer-reported status of a sighted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxSightingStatus {
    Pending,
    Confirmed,
    Failed,
}

/// One "transaction sighted" notification from the wallet observer.
///
/// Incoming sightings feed the deposit pipeline; outgoing sightings feed
/// withdrawal confirmation monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxSighting {
    pub wallet_id: String,
    pub user_id: UserId,
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub block_height: u64,
    pub confirmations: u32,
    pub chain: String,
    pub token: Option<String>,
    pub token_symbol: Option<String>,
    pub direction: TxDirection,
    pub status: TxSightingStatus,
    pub seen_at: DateTime<Utc>,
}

/// Shared pool of chain adapters, keyed by chain name.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters
            .insert(adapter.chain_name().to_string(), adapter);
    }

    /// Look up the adapter for `chain`.
    pub fn get(&self, chain: &str) -> Result<Arc<dyn ChainAdapter>> {
        self.adapters
            .get(chain)
            .cloned()
            .ok_or_else(|| SettleError::UnsupportedChain(chain.to_string()))
    }

    #[must_use]
    pub fn chains(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("chains", &self.chains())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// In-memory adapter double for tests
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "test-helpers"))]
pub use memory::MemoryAdapter;

#[cfg(any(test, feature = "test-helpers"))]
mod memory {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use super::{
        BalanceSnapshot, ChainAdapter, Decimal, Result, SettleError, SignedTransaction,
        TransactionRequest, UnsignedTransaction, async_trait,
    };

    /// Deterministic in-memory chain adapter for tests.
    ///
    /// Addresses are valid unless explicitly rejected; balances come from a
    /// settable map; broadcasts mint sequential tx hashes and can be forced
    /// to fail.
    pub struct MemoryAdapter {
        chain: String,
        fee: Mutex<Option<Decimal>>,
        balances: Mutex<HashMap<String, Decimal>>,
        invalid_addresses: Mutex<HashSet<String>>,
        fail_broadcast: AtomicBool,
        broadcast_seq: AtomicU64,
        broadcasts: Mutex<Vec<TransactionRequest>>,
    }

    impl MemoryAdapter {
        #[must_use]
        pub fn new(chain: &str) -> Self {
            Self {
                chain: chain.to_string(),
                fee: Mutex::new(Some(Decimal::new(1, 3))),
                balances: Mutex::new(HashMap::new()),
                invalid_addresses: Mutex::new(HashSet::new()),
                fail_broadcast: AtomicBool::new(false),
                broadcast_seq: AtomicU64::new(0),
                broadcasts: Mutex::new(Vec::new()),
            }
        }

        pub fn set_balance(&self, address: &str, balance: Decimal) {
            self.balances
                .lock()
                .expect("balances lock")
                .insert(address.to_string(), balance);
        }

        pub fn set_fee(&self, fee: Option<Decimal>) {
            *self.fee.lock().expect("fee lock") = fee;
        }

        pub fn reject_address(&self, address: &str) {
            self.invalid_addresses
                .lock()
                .expect("invalid lock")
                .insert(address.to_string());
        }

        pub fn set_fail_broadcast(&self, fail: bool) {
            self.fail_broadcast.store(fail, Ordering::SeqCst);
        }

        #[must_use]
        pub fn broadcast_count(&self) -> u64 {
            self.broadcast_seq.load(Ordering::SeqCst)
        }

        #[must_use]
        pub fn broadcast_requests(&self) -> Vec<TransactionRequest> {
            self.broadcasts.lock().expect("broadcasts lock").clone()
        }
    }

    #[async_trait]
    impl ChainAdapter for MemoryAdapter {
        fn chain_name(&self) -> &str {
            &self.chain
        }

        fn native_decimals(&self) -> u32 {
            18
        }

        fn confirmation_threshold(&self) -> u32 {
            12
        }

        async fn validate_address(&self, address: &str) -> Result<bool> {
            let invalid = self.invalid_addresses.lock().expect("invalid lock");
            Ok(!address.is_empty() && !invalid.contains(address))
        }

        async fn get_balance(&self, address: &str) -> Result<BalanceSnapshot> {
            let balance = self
                .balances
                .lock()
                .expect("balances lock")
                .get(address)
                .copied()
                .unwrap_or(Decimal::ZERO);
            Ok(BalanceSnapshot {
                balance,
                confirmed: balance,
                unconfirmed: Decimal::ZERO,
                block_height: 1_000,
            })
        }

        async fn fee_estimate(&self) -> Result<Decimal> {
            let fee = *self.fee.lock().expect("fee lock");
            fee.ok_or_else(|| SettleError::AdapterFailure {
                chain: self.chain.clone(),
                reason: "fee data unavailable".to_string(),
            })
        }

        async fn create_transaction(
            &self,
            request: &TransactionRequest,
        ) -> Result<UnsignedTransaction> {
            if request.outputs.is_empty() {
                return Err(SettleError::AdapterFailure {
                    chain: self.chain.clone(),
                    reason: "no outputs".to_string(),
                });
            }
            Ok(UnsignedTransaction {
                request: request.clone(),
                estimated_fee: Decimal::new(1, 3),
            })
        }

        async fn sign_transaction(
            &self,
            unsigned: UnsignedTransaction,
        ) -> Result<SignedTransaction> {
            Ok(SignedTransaction {
                unsigned,
                signature: "memsig".to_string(),
            })
        }

        async fn broadcast_transaction(&self, signed: &SignedTransaction) -> Result<String> {
            if self.fail_broadcast.load(Ordering::SeqCst) {
                return Err(SettleError::BroadcastFailed {
                    reason: "forced failure".to_string(),
                });
            }
            let seq = self.broadcast_seq.fetch_add(1, Ordering::SeqCst) + 1;
            self.broadcasts
                .lock()
                .expect("broadcasts lock")
                .push(signed.unsigned.request.clone());
            Ok(format!("0x{}-tx-{seq}", self.chain))
        }
    }
}
