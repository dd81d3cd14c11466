//! Capped, append-only audit trail.

use std::collections::VecDeque;

use opensettle_types::{AuditEntry, EventBus, SettleEvent, constants};

/// In-memory audit log. Holds the most recent
/// [`constants::MAX_AUDIT_ENTRIES`] entries; the oldest is evicted first.
/// Every write is also published as an event.
#[derive(Debug)]
pub struct AuditTrail {
    entries: VecDeque<AuditEntry>,
    events: EventBus,
}

impl AuditTrail {
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            entries: VecDeque::new(),
            events,
        }
    }

    /// Append an entry, evicting the oldest past the cap.
    pub fn record(&mut self, action: &str, user: &str, resource: &str, details: &str) {
        let entry = AuditEntry::new(action, user, resource, details);
        tracing::debug!(action, user, resource, "Audit");
        self.events.emit(SettleEvent::AuditEntryRecorded {
            entry: entry.clone(),
        });
        self.entries.push_back(entry);
        while self.entries.len() > constants::MAX_AUDIT_ENTRIES {
            self.entries.pop_front();
        }
    }

    /// All retained entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    /// The most recent `n` entries, newest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<&AuditEntry> {
        self.entries.iter().rev().take(n).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_orders_entries() {
        let mut trail = AuditTrail::new(EventBus::new(16));
        trail.record("wallet_added", "ops", "tw:1", "");
        trail.record("operation_created", "alice", "op:1", "transfer");

        let actions: Vec<&str> = trail.entries().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, ["wallet_added", "operation_created"]);
        assert_eq!(trail.recent(1)[0].action, "operation_created");
    }

    #[test]
    fn caps_at_max_entries() {
        let mut trail = AuditTrail::new(EventBus::new(16));
        for i in 0..constants::MAX_AUDIT_ENTRIES + 5 {
            trail.record("tick", "ops", &format!("r:{i}"), "");
        }
        assert_eq!(trail.len(), constants::MAX_AUDIT_ENTRIES);
        // Oldest evicted first.
        let first = trail.entries().next().unwrap();
        assert_eq!(first.resource, "r:5");
    }

    #[tokio::test]
    async fn each_write_is_published() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let mut trail = AuditTrail::new(bus);
        trail.record("emergency_stop_enabled", "ops", "treasury", "");

        let event = rx.recv().await.unwrap();
        match event {
            SettleEvent::AuditEntryRecorded { entry } => {
                assert_eq!(entry.action, "emergency_stop_enabled");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
