//! # Sync Results
//!
//! Values produced by the engine and handed back to callers. Nothing in
//! here is an error type: every failure is captured into one of these.
//!
//! ```text
//! CycleResult
//! ├── success, message
//! ├── pull: PhaseReport ── details: { entity → EntityResult }
//! └── push: PhaseReport ── details: { entity → EntityResult }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

// =============================================================================
// Per-entity
// =============================================================================

/// Outcome of one phase for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityResult {
    pub success: bool,
    pub message: String,
    pub count: usize,
}

impl EntityResult {
    /// Successful phase with `count` records moved.
    pub fn ok(count: usize, message: impl Into<String>) -> Self {
        EntityResult {
            success: true,
            message: message.into(),
            count,
        }
    }

    /// Failed phase; nothing is counted.
    pub fn failed(message: impl Into<String>) -> Self {
        EntityResult {
            success: false,
            message: message.into(),
            count: 0,
        }
    }
}

// =============================================================================
// Per-phase
// =============================================================================

/// Aggregate of one phase (pull or push) across all entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    /// True when every entity succeeded.
    pub success: bool,
    pub message: String,
    /// Total records moved.
    pub count: usize,
    pub details: BTreeMap<String, EntityResult>,
}

impl PhaseReport {
    /// Builds the aggregate from per-entity results. `verb` is `"Pulled"`
    /// or `"Pushed"`.
    pub fn aggregate(verb: &str, details: BTreeMap<String, EntityResult>) -> Self {
        let count = details.values().map(|r| r.count).sum();
        let success = details.values().all(|r| r.success);
        let message = format!(
            "{verb} {count} total records across {} entities",
            details.len()
        );

        PhaseReport {
            success,
            message,
            count,
            details,
        }
    }

    /// Names of entities that failed in this phase.
    pub fn failed_entities(&self) -> Vec<&str> {
        self.details
            .iter()
            .filter(|(_, r)| !r.success)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

// =============================================================================
// Per-cycle
// =============================================================================

/// Result of one orchestrated sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleResult {
    /// True when both phases succeeded.
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull: Option<PhaseReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<PhaseReport>,
}

/// Message for a cycle postponed by the connectivity probe.
pub const OFFLINE_MESSAGE: &str = "offline, sync postponed";

/// Message for a cycle refused because another one holds the lock.
pub const IN_PROGRESS_MESSAGE: &str = "sync already in progress";

impl CycleResult {
    /// Combines the two phase reports.
    pub fn completed(pull: PhaseReport, push: PhaseReport) -> Self {
        let success = pull.success && push.success;
        let message = if success {
            format!(
                "Sync completed: {} pulled, {} pushed",
                pull.count, push.count
            )
        } else {
            let mut failed: Vec<&str> = pull.failed_entities();
            failed.extend(push.failed_entities());
            failed.sort_unstable();
            failed.dedup();
            format!("Sync completed with errors in: {}", failed.join(", "))
        };

        CycleResult {
            success,
            message,
            pull: Some(pull),
            push: Some(push),
        }
    }

    /// Cycle not run because the network probe failed.
    pub fn offline() -> Self {
        Self::aborted(OFFLINE_MESSAGE)
    }

    /// Cycle not run because another cycle is active.
    pub fn in_progress() -> Self {
        Self::aborted(IN_PROGRESS_MESSAGE)
    }

    /// Cycle that never reached the pull phase.
    pub fn aborted(message: impl Into<String>) -> Self {
        CycleResult {
            success: false,
            message: message.into(),
            pull: None,
            push: None,
        }
    }
}

// =============================================================================
// Batch application
// =============================================================================

/// Why one record of a batch was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordRejection {
    /// Position in the inbound batch.
    pub index: usize,
    /// Record id when it had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub reason: String,
}

impl RecordRejection {
    pub fn new(index: usize, id: Option<String>, reason: impl ToString) -> Self {
        RecordRejection {
            index,
            id,
            reason: reason.to_string(),
        }
    }
}

/// Tally of applying an inbound batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub received: usize,
    pub applied: usize,
    pub stale: usize,
    pub rejected: Vec<RecordRejection>,
}

impl ApplyReport {
    pub fn new(received: usize) -> Self {
        ApplyReport {
            received,
            ..Default::default()
        }
    }

    pub fn record_applied(&mut self) {
        self.applied += 1;
    }

    pub fn record_stale(&mut self) {
        self.stale += 1;
    }

    pub fn record_rejected(&mut self, rejection: RecordRejection) {
        self.rejected.push(rejection);
    }

    /// Rejection reasons as display strings.
    pub fn error_messages(&self) -> Vec<String> {
        self.rejected
            .iter()
            .map(|r| match &r.id {
                Some(id) => format!("Record {}: {}", id, r.reason),
                None => format!("Record #{}: {}", r.index, r.reason),
            })
            .collect()
    }
}

// =============================================================================
// Status
// =============================================================================

/// Sync status of one entity.
///
/// `pending_sync` counts rows changed after `last_sync`; it is 0 for
/// tables without timestamp columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStatus {
    pub model: String,
    pub last_sync: Timestamp,
    pub total_records: i64,
    pub pending_sync: i64,
    /// Set when the counts could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn details(entries: &[(&str, EntityResult)]) -> BTreeMap<String, EntityResult> {
        entries
            .iter()
            .map(|(name, r)| (name.to_string(), r.clone()))
            .collect()
    }

    #[test]
    fn test_phase_aggregate() {
        let report = PhaseReport::aggregate(
            "Pulled",
            details(&[
                ("orders", EntityResult::ok(3, "ok")),
                ("customers", EntityResult::ok(2, "ok")),
            ]),
        );
        assert!(report.success);
        assert_eq!(report.count, 5);
        assert_eq!(report.message, "Pulled 5 total records across 2 entities");
    }

    #[test]
    fn test_phase_fails_when_any_entity_fails() {
        let report = PhaseReport::aggregate(
            "Pushed",
            details(&[
                ("orders", EntityResult::ok(1, "ok")),
                ("customers", EntityResult::failed("HTTP 500")),
            ]),
        );
        assert!(!report.success);
        assert_eq!(report.count, 1);
        assert_eq!(report.failed_entities(), vec!["customers"]);
    }

    #[test]
    fn test_empty_phase_succeeds() {
        let report = PhaseReport::aggregate("Pulled", BTreeMap::new());
        assert!(report.success);
        assert_eq!(report.message, "Pulled 0 total records across 0 entities");
    }

    #[test]
    fn test_cycle_combines_phases() {
        let pull = PhaseReport::aggregate("Pulled", details(&[("orders", EntityResult::ok(3, ""))]));
        let push = PhaseReport::aggregate(
            "Pushed",
            details(&[("orders", EntityResult::failed("HTTP 500"))]),
        );
        let cycle = CycleResult::completed(pull, push);
        assert!(!cycle.success);
        assert!(cycle.message.contains("orders"));
    }

    #[test]
    fn test_offline_cycle_serializes_without_phases() {
        let json = serde_json::to_value(CycleResult::offline()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], OFFLINE_MESSAGE);
        assert!(json.get("pull").is_none());
    }

    #[test]
    fn test_apply_report_messages() {
        let mut report = ApplyReport::new(2);
        report.record_applied();
        report.record_rejected(RecordRejection::new(1, None, &ValidationError::MissingId));
        assert_eq!(report.error_messages(), vec!["Record #1: Missing ID".to_string()]);
    }
}
