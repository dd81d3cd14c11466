//! Structured metadata annotations on settlement entities.
//!
//! The well-known keys below are the documented contract; pipelines may add
//! further keys but must not repurpose these.

use std::collections::BTreeMap;

/// Free-form but structured key-value annotations.
///
/// `BTreeMap` keeps serialization order deterministic.
pub type Metadata = BTreeMap<String, String>;

/// Last execution error recorded on a `failed` entity.
pub const META_ERROR: &str = "error";

/// Serialized risk assessment summary attached to a treasury operation.
pub const META_RISK_ASSESSMENT: &str = "risk_assessment";

/// Set on withdrawals held in `pending` by the large-amount approval gate.
pub const META_REQUIRES_APPROVAL: &str = "requires_approval";

/// Approver recorded when a held withdrawal is released to the queue.
pub const META_APPROVED_BY: &str = "approved_by";

/// Reason recorded when a deposit fails the amount floor.
pub const META_FAILURE_REASON: &str = "failure_reason";
