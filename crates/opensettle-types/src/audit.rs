//! Audit trail entry: who did what to which resource, when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AuditId;

/// One append-only audit record. The trail is capped at the most recent
/// 10,000 entries; each write is also emitted as an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub timestamp: DateTime<Utc>,
    /// Action tag, e.g. `operation_created`, `emergency_stop_enabled`.
    pub action: String,
    pub user: String,
    /// Entity id the action touched.
    pub resource: String,
    pub details: String,
}

impl AuditEntry {
    #[must_use]
    pub fn new(action: &str, user: &str, resource: &str, details: &str) -> Self {
        Self {
            id: AuditId::new(),
            timestamp: Utc::now(),
            action: action.to_string(),
            user: user.to_string(),
            resource: resource.to_string(),
            details: details.to_string(),
        }
    }
}
