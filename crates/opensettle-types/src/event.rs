//! In-process publish/subscribe for settlement events.
//!
//! Events are a tagged union rather than an untyped emitter: every channel
//! the engine exposes is one [`SettleEvent`] variant with a typed payload.
//! Delivery is at-least-once to live in-process subscribers; a lagging
//! subscriber drops the oldest events (broadcast ring semantics), it never
//! blocks the publisher.

use rust_decimal::Decimal;
use tokio::sync::broadcast;

use crate::{
    AuditEntry, BatchId, DepositId, OperationId, WalletId, WithdrawalId, constants,
};

/// Every event the settlement engine publishes.
#[derive(Debug, Clone)]
pub enum SettleEvent {
    // --- Deposit lifecycle ---
    DepositDetected { id: DepositId, chain: String, amount: Decimal },
    DepositConfirming { id: DepositId, confirmations: u32 },
    DepositConfirmed { id: DepositId, confirmations: u32 },
    DepositCredited { id: DepositId, amount: Decimal },
    DepositFailed { id: DepositId, reason: String },

    // --- Withdrawal lifecycle ---
    WithdrawalCreated { id: WithdrawalId, chain: String, amount: Decimal },
    WithdrawalApproved { id: WithdrawalId, approver: String },
    WithdrawalProcessing { id: WithdrawalId },
    WithdrawalBroadcast { id: WithdrawalId, tx_hash: String },
    WithdrawalCompleted { id: WithdrawalId },
    WithdrawalFailed { id: WithdrawalId, reason: String },

    // --- Batch lifecycle ---
    BatchCreated { id: BatchId, chain: String, members: usize },
    BatchProcessing { id: BatchId },
    BatchBroadcast { id: BatchId, tx_hash: String },
    BatchCompleted { id: BatchId },
    BatchFailed { id: BatchId, reason: String },

    // --- Treasury ---
    OperationCreated { id: OperationId, amount: Decimal },
    OperationApproved { id: OperationId, approver: String },
    OperationExecuted { id: OperationId, tx_hash: String },
    OperationFailed { id: OperationId, reason: String },
    WalletAdded { id: WalletId, chain: String },
    WalletRemoved { id: WalletId },
    BalanceChanged { id: WalletId, previous: Decimal, current: Decimal },
    EmergencyStop { user: String },
    EmergencyStopDisabled { user: String },
    AuditEntryRecorded { entry: AuditEntry },
}

/// Cloneable handle to the in-process event bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SettleEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all events from this point forward.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SettleEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. A send with zero live subscribers is not an error.
    pub fn emit(&self, event: SettleEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(constants::DEFAULT_EVENT_CAPACITY)
    }
}
