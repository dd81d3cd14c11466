//! Treasury engine: wallet registry, N-of-M operation approval, risk
//! gating, execution through chain adapters, and the emergency stop.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;

use opensettle_types::{
    AdapterRegistry, EventBus, META_ERROR, META_RISK_ASSESSMENT, Metadata, OperationId,
    OperationStatus, OperationType, Recommendation, Result, RiskAssessment, SettleError,
    SettleEvent, TransactionRequest, TreasuryConfig, TreasuryOperation, TreasuryWallet, TxOutput,
    WalletId,
};

use crate::audit::AuditTrail;
use crate::risk_engine::RiskEngine;

/// Parameters for creating a treasury operation.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub op_type: OperationType,
    /// Source address. For pool operations this is the external deposit
    /// address; otherwise it must be a registered wallet's address.
    pub from_wallet: String,
    pub to_wallet: Option<String>,
    pub amount: Decimal,
    pub token: Option<String>,
    pub chain: String,
    /// `None` takes the configured default. Zero means auto-execute.
    pub required_signatures: Option<u32>,
    pub reason: String,
    pub requested_by: String,
}

/// Owns treasury wallets and operations and drives the approval state
/// machine. All mutating entry points fail fast under the emergency stop;
/// reads and the audit trail stay available.
pub struct TreasuryEngine {
    config: TreasuryConfig,
    adapters: AdapterRegistry,
    wallets: HashMap<WalletId, TreasuryWallet>,
    operations: HashMap<OperationId, TreasuryOperation>,
    risk: RiskEngine,
    audit: AuditTrail,
    events: EventBus,
    emergency_stop: bool,
}

impl TreasuryEngine {
    #[must_use]
    pub fn new(config: TreasuryConfig, adapters: AdapterRegistry, events: EventBus) -> Self {
        let risk = RiskEngine::new(config.risk.clone());
        let audit = AuditTrail::new(events.clone());
        Self {
            config,
            adapters,
            wallets: HashMap::new(),
            operations: HashMap::new(),
            risk,
            audit,
            events,
            emergency_stop: false,
        }
    }

    fn guard_stop(&self) -> Result<()> {
        if self.emergency_stop {
            return Err(SettleError::EmergencyStopActive);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Wallet registry
    // -----------------------------------------------------------------

    pub fn add_wallet(&mut self, wallet: TreasuryWallet, user: &str) -> Result<WalletId> {
        self.guard_stop()?;
        let id = wallet.id;
        tracing::info!(
            wallet = %id,
            chain = %wallet.chain,
            wallet_type = %wallet.wallet_type,
            purpose = %wallet.purpose,
            "Wallet added"
        );
        self.audit.record(
            "wallet_added",
            user,
            &id.to_string(),
            &format!("{} {} {}", wallet.chain, wallet.wallet_type, wallet.address),
        );
        self.events.emit(SettleEvent::WalletAdded {
            id,
            chain: wallet.chain.clone(),
        });
        self.wallets.insert(id, wallet);
        Ok(id)
    }

    /// Remove a wallet. Refused while the wallet still holds funds.
    pub fn remove_wallet(&mut self, id: WalletId, user: &str) -> Result<TreasuryWallet> {
        self.guard_stop()?;
        let wallet = self
            .wallets
            .get(&id)
            .ok_or(SettleError::WalletNotFound(id))?;
        if wallet.balance != Decimal::ZERO {
            return Err(SettleError::WalletNotEmpty {
                balance: wallet.balance,
            });
        }
        let wallet = self
            .wallets
            .remove(&id)
            .ok_or(SettleError::WalletNotFound(id))?;
        self.audit
            .record("wallet_removed", user, &id.to_string(), &wallet.address);
        self.events.emit(SettleEvent::WalletRemoved { id });
        Ok(wallet)
    }

    #[must_use]
    pub fn wallet(&self, id: WalletId) -> Option<&TreasuryWallet> {
        self.wallets.get(&id)
    }

    #[must_use]
    pub fn wallet_by_address(&self, address: &str) -> Option<&TreasuryWallet> {
        self.wallets.values().find(|w| w.address == address)
    }

    #[must_use]
    pub fn wallets(&self) -> Vec<&TreasuryWallet> {
        self.wallets.values().collect()
    }

    // -----------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------

    /// Validate, risk-gate, and register an operation.
    ///
    /// A `deny` recommendation stores the operation as `CANCELLED` and
    /// returns the denial; `review` proceeds and is surfaced through the
    /// risk metadata. Operations requiring zero signatures execute before
    /// this returns.
    pub async fn create_operation(&mut self, request: OperationRequest) -> Result<OperationId> {
        self.guard_stop()?;
        if request.amount <= Decimal::ZERO {
            return Err(SettleError::Configuration(format!(
                "operation amount must be positive, got {}",
                request.amount
            )));
        }
        // Pool operations source from external deposit addresses; every
        // other type spends from a registered wallet and must cover the
        // amount.
        if request.op_type != OperationType::Pool {
            let source = self.wallet_by_address(&request.from_wallet).ok_or_else(|| {
                SettleError::SourceWalletUnknown {
                    address: request.from_wallet.clone(),
                }
            })?;
            if source.balance < request.amount {
                return Err(SettleError::InsufficientTreasuryBalance {
                    needed: request.amount,
                    available: source.balance,
                });
            }
        }

        let id = OperationId::new();
        let now = Utc::now();
        let assessment = self
            .risk
            .assess(id, request.amount, request.to_wallet.as_deref(), now);

        let required = request
            .required_signatures
            .unwrap_or(self.config.default_required_signatures);
        let mut metadata = Metadata::new();
        metadata.insert(META_RISK_ASSESSMENT.to_string(), assessment.summary());

        let mut operation = TreasuryOperation {
            id,
            op_type: request.op_type,
            status: OperationStatus::Pending,
            from_wallet: request.from_wallet,
            to_wallet: request.to_wallet,
            amount: request.amount,
            token: request.token,
            chain: request.chain,
            required_signatures: required,
            signatures: Vec::new(),
            approved_by: Vec::new(),
            tx_hash: None,
            reason: request.reason,
            requested_by: request.requested_by.clone(),
            created_at: now,
            executed_at: None,
            metadata,
        };

        if assessment.recommendation == Recommendation::Deny {
            operation.status = OperationStatus::Cancelled;
            tracing::warn!(
                operation = %id,
                score = assessment.score,
                "Operation denied by risk assessment"
            );
            self.audit.record(
                "operation_denied",
                &request.requested_by,
                &id.to_string(),
                &assessment.summary(),
            );
            self.operations.insert(id, operation);
            return Err(SettleError::RiskDenied {
                score: assessment.score,
            });
        }

        tracing::info!(
            operation = %id,
            op_type = %operation.op_type,
            amount = %operation.amount,
            chain = %operation.chain,
            required_signatures = required,
            "Operation created"
        );
        self.audit.record(
            "operation_created",
            &request.requested_by,
            &id.to_string(),
            &format!(
                "{} {} on {} ({})",
                operation.op_type, operation.amount, operation.chain, operation.reason
            ),
        );
        self.events.emit(SettleEvent::OperationCreated {
            id,
            amount: operation.amount,
        });
        self.operations.insert(id, operation);

        if required == 0 {
            if let Some(op) = self.operations.get_mut(&id) {
                op.transition(OperationStatus::Pending, OperationStatus::Approved)?;
            }
            self.execute_operation(id).await?;
        }
        Ok(id)
    }

    /// Record one unique approval. Meeting the threshold executes the
    /// operation synchronously before this returns.
    pub async fn approve_operation(&mut self, id: OperationId, approver: &str) -> Result<()> {
        self.guard_stop()?;
        let operation = self
            .operations
            .get_mut(&id)
            .ok_or(SettleError::OperationNotFound(id))?;
        if operation.status != OperationStatus::Pending {
            return Err(SettleError::OperationNotPending {
                id,
                status: operation.status.to_string(),
            });
        }
        if operation.signatures.iter().any(|s| s == approver) {
            return Err(SettleError::DuplicateApproval {
                approver: approver.to_string(),
            });
        }
        operation.signatures.push(approver.to_string());
        operation.approved_by.push(approver.to_string());
        let collected = operation.signatures.len();
        let required = operation.required_signatures;
        let fully_signed = operation.fully_signed();

        tracing::info!(operation = %id, approver, collected, required, "Operation approved");
        self.audit.record(
            "operation_approved",
            approver,
            &id.to_string(),
            &format!("{collected}/{required} signatures"),
        );
        self.events.emit(SettleEvent::OperationApproved {
            id,
            approver: approver.to_string(),
        });

        if fully_signed {
            if let Some(op) = self.operations.get_mut(&id) {
                op.transition(OperationStatus::Pending, OperationStatus::Approved)?;
            }
            self.execute_operation(id).await?;
        }
        Ok(())
    }

    /// Execute an approved operation through its chain adapter and refresh
    /// the touched wallet balances. Failure marks the operation `FAILED`
    /// with the reason recorded; it is never retried.
    pub async fn execute_operation(&mut self, id: OperationId) -> Result<String> {
        self.guard_stop()?;
        let (chain, from, to, amount, token) = {
            let operation = self
                .operations
                .get(&id)
                .ok_or(SettleError::OperationNotFound(id))?;
            if operation.status != OperationStatus::Approved {
                return Err(SettleError::OperationNotPending {
                    id,
                    status: operation.status.to_string(),
                });
            }
            let to = operation.to_wallet.clone().ok_or_else(|| {
                SettleError::Configuration(format!("operation {id} has no destination"))
            })?;
            (
                operation.chain.clone(),
                operation.from_wallet.clone(),
                to,
                operation.amount,
                operation.token.clone(),
            )
        };

        let outcome = match self.adapters.get(&chain) {
            Ok(adapter) => {
                let request = TransactionRequest {
                    chain: chain.clone(),
                    from: from.clone(),
                    outputs: vec![TxOutput {
                        address: to.clone(),
                        amount,
                    }],
                    token,
                };
                async {
                    let unsigned = adapter.create_transaction(&request).await?;
                    let signed = adapter.sign_transaction(unsigned).await?;
                    adapter.broadcast_transaction(&signed).await
                }
                .await
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(tx_hash) => {
                if let Some(op) = self.operations.get_mut(&id) {
                    op.transition(OperationStatus::Approved, OperationStatus::Executed)?;
                    op.tx_hash = Some(tx_hash.clone());
                    op.executed_at = Some(Utc::now());
                }
                tracing::info!(operation = %id, tx_hash = %tx_hash, "Operation executed");
                self.audit
                    .record("operation_executed", "system", &id.to_string(), &tx_hash);
                self.events.emit(SettleEvent::OperationExecuted {
                    id,
                    tx_hash: tx_hash.clone(),
                });
                self.refresh_addresses(&[&from, &to]).await;
                Ok(tx_hash)
            }
            Err(err) => {
                let reason = err.to_string();
                if let Some(op) = self.operations.get_mut(&id) {
                    op.status = OperationStatus::Failed;
                    op.metadata.insert(META_ERROR.to_string(), reason.clone());
                }
                tracing::warn!(operation = %id, error = %reason, "Operation execution failed");
                self.audit
                    .record("operation_failed", "system", &id.to_string(), &reason);
                self.events.emit(SettleEvent::OperationFailed { id, reason });
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn operation(&self, id: OperationId) -> Option<&TreasuryOperation> {
        self.operations.get(&id)
    }

    #[must_use]
    pub fn operations(&self) -> Vec<&TreasuryOperation> {
        self.operations.values().collect()
    }

    #[must_use]
    pub fn operations_by_status(&self, status: OperationStatus) -> Vec<&TreasuryOperation> {
        self.operations
            .values()
            .filter(|o| o.status == status)
            .collect()
    }

    // -----------------------------------------------------------------
    // Balances
    // -----------------------------------------------------------------

    /// Refresh every wallet's last-observed balance from its chain.
    /// Per-wallet failures are logged and never abort the sweep. Returns
    /// how many balances changed.
    pub async fn refresh_balances(&mut self) -> usize {
        let ids: Vec<WalletId> = self.wallets.keys().copied().collect();
        let mut changed = 0;
        for id in ids {
            if self.refresh_wallet(id).await {
                changed += 1;
            }
        }
        changed
    }

    async fn refresh_addresses(&mut self, addresses: &[&str]) {
        let ids: Vec<WalletId> = self
            .wallets
            .values()
            .filter(|w| addresses.contains(&w.address.as_str()))
            .map(|w| w.id)
            .collect();
        for id in ids {
            self.refresh_wallet(id).await;
        }
    }

    async fn refresh_wallet(&mut self, id: WalletId) -> bool {
        let Some((address, chain, previous)) = self
            .wallets
            .get(&id)
            .map(|w| (w.address.clone(), w.chain.clone(), w.balance))
        else {
            return false;
        };
        let Ok(adapter) = self.adapters.get(&chain) else {
            return false;
        };
        match adapter.get_balance(&address).await {
            Ok(snapshot) if snapshot.balance != previous => {
                if let Some(wallet) = self.wallets.get_mut(&id) {
                    wallet.balance = snapshot.balance;
                }
                self.events.emit(SettleEvent::BalanceChanged {
                    id,
                    previous,
                    current: snapshot.balance,
                });
                true
            }
            Ok(_) => false,
            Err(err) => {
                tracing::warn!(wallet = %id, error = %err, "Balance refresh failed");
                false
            }
        }
    }

    // -----------------------------------------------------------------
    // Emergency stop
    // -----------------------------------------------------------------

    /// Halt all mutating treasury actions. Idempotent.
    pub fn enable_emergency_stop(&mut self, user: &str) {
        if self.emergency_stop {
            return;
        }
        self.emergency_stop = true;
        tracing::error!(user, "EMERGENCY STOP enabled");
        self.audit
            .record("emergency_stop_enabled", user, "treasury", "");
        self.events.emit(SettleEvent::EmergencyStop {
            user: user.to_string(),
        });
    }

    /// Resume normal operation. Idempotent.
    pub fn disable_emergency_stop(&mut self, user: &str) {
        if !self.emergency_stop {
            return;
        }
        self.emergency_stop = false;
        tracing::warn!(user, "Emergency stop disabled");
        self.audit
            .record("emergency_stop_disabled", user, "treasury", "");
        self.events.emit(SettleEvent::EmergencyStopDisabled {
            user: user.to_string(),
        });
    }

    #[must_use]
    pub fn emergency_stop_active(&self) -> bool {
        self.emergency_stop
    }

    // -----------------------------------------------------------------
    // Risk and audit access
    // -----------------------------------------------------------------

    #[must_use]
    pub fn risk_assessment(&self, id: OperationId) -> Option<&RiskAssessment> {
        self.risk.cached(id)
    }

    /// Sweep expired risk assessments out of the cache.
    pub fn evict_expired_assessments(&mut self, now: chrono::DateTime<Utc>) -> usize {
        self.risk.evict_expired(now)
    }

    #[must_use]
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    #[must_use]
    pub fn config(&self) -> &TreasuryConfig {
        &self.config
    }
}
