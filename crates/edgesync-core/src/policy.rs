//! # Upsert Admission Policy
//!
//! Decides whether an inbound record may be merged into local storage, and
//! in what shape. Storage itself happens in edgesync-sync; this module only
//! answers "accept, skip or reject".
//!
//! ## Decision Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       admit(record, watermark)                          │
//! │                                                                         │
//! │  1. id missing/blank?              ──yes──► Reject(MissingId)           │
//! │  2. effective = updated_at ?? created_at                                │
//! │  3. effective parses && <= watermark ──yes──► Stale (not an error)      │
//! │  4. normalize date fields (unparseable → dropped)                       │
//! │                                    ─────────► Accept(normalized)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An effective timestamp that does not parse disables the staleness check;
//! the record is admitted and its bad date field dropped in step 4.
//! The policy is a pure function of `(record, watermark)`, so applying the
//! same record twice against the same watermark yields the same decision.

use crate::error::ValidationError;
use crate::record::Record;
use crate::timestamp::Timestamp;

/// Outcome of running one record through the policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Record may be merged. Date fields are in canonical form.
    Accept(Record),

    /// Record is not newer than the watermark and is skipped.
    Stale { id: String, effective: Timestamp },

    /// Record can never be stored.
    Reject(ValidationError),
}

/// Runs the admission policy against an entity's watermark.
pub fn admit(mut record: Record, watermark: Timestamp) -> Admission {
    let id = match record.id() {
        Ok(id) => id,
        Err(err) => return Admission::Reject(err),
    };

    if let Some(effective) = record.effective_timestamp() {
        if effective <= watermark {
            return Admission::Stale { id, effective };
        }
    }

    record.normalize_dates();
    Admission::Accept(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn watermark() -> Timestamp {
        "2025-07-07 12:00:00".parse().unwrap()
    }

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_id_rejected() {
        let outcome = admit(record(json!({"name": "no id"})), watermark());
        assert_eq!(outcome, Admission::Reject(ValidationError::MissingId));

        let outcome = admit(record(json!({"id": ""})), watermark());
        assert_eq!(outcome, Admission::Reject(ValidationError::MissingId));
    }

    #[test]
    fn test_equal_to_watermark_is_stale() {
        let outcome = admit(
            record(json!({"id": 1, "updated_at": "2025-07-07 12:00:00"})),
            watermark(),
        );
        assert!(matches!(outcome, Admission::Stale { ref id, .. } if id == "1"));
    }

    #[test]
    fn test_older_created_at_is_stale_when_no_updated_at() {
        let outcome = admit(
            record(json!({"id": "a", "created_at": "2025-07-01 00:00:00"})),
            watermark(),
        );
        assert!(matches!(outcome, Admission::Stale { .. }));
    }

    #[test]
    fn test_newer_record_accepted_and_normalized() {
        let outcome = admit(
            record(json!({"id": "a", "updated_at": "2025-07-07T12:00:01.500Z"})),
            watermark(),
        );
        match outcome {
            Admission::Accept(r) => {
                assert_eq!(r.get_str("updated_at"), Some("2025-07-07 12:00:01"))
            }
            other => panic!("expected accept, got {other:?}"),
        }
    }

    #[test]
    fn test_undated_record_accepted() {
        assert!(matches!(
            admit(record(json!({"id": "a", "name": "x"})), watermark()),
            Admission::Accept(_)
        ));
    }

    #[test]
    fn test_unparseable_effective_date_skips_check() {
        let outcome = admit(
            record(json!({"id": "a", "updated_at": "soon", "created_at": "2020-01-01 00:00:00"})),
            watermark(),
        );
        match outcome {
            Admission::Accept(r) => {
                assert!(r.get("updated_at").is_none());
                assert_eq!(r.get_str("created_at"), Some("2020-01-01 00:00:00"));
            }
            other => panic!("expected accept, got {other:?}"),
        }
    }

    #[test]
    fn test_idempotent_decision() {
        let input = record(json!({"id": 7, "updated_at": "2025-07-08 00:00:00"}));
        assert_eq!(admit(input.clone(), watermark()), admit(input, watermark()));
    }
}
