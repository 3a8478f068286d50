//! Condition bookkeeping for custom resource status

use chrono::{DateTime, SecondsFormat, Utc};
use router_api::Condition;

/// The single condition type this controller maintains
pub const RESOURCES_AVAILABLE: &str = "ResourcesAvailable";
pub const REASON_SUCCEEDED: &str = "Succeeded";
pub const MESSAGE_SYNCED: &str = "Sync Successfully";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

pub fn new_condition(
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    observed_generation: i64,
    now: DateTime<Utc>,
) -> Condition {
    Condition {
        r#type: type_.to_string(),
        status: status.as_str().to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation: Some(observed_generation),
        last_transition_time: now.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

/// Insert `condition`, replacing any existing entry of the same type.
///
/// The existing transition time is kept when the status did not change.
/// Returns false when nothing but the timestamp would differ.
pub fn upsert_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition.r#type) else {
        conditions.push(condition);
        return true;
    };

    if existing.status == condition.status {
        condition.last_transition_time = existing.last_transition_time.clone();
    }
    if *existing == condition {
        return false;
    }
    *existing = condition;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn synced(generation: i64, now: DateTime<Utc>) -> Condition {
        new_condition(
            RESOURCES_AVAILABLE,
            ConditionStatus::True,
            REASON_SUCCEEDED,
            MESSAGE_SYNCED,
            generation,
            now,
        )
    }

    #[test]
    fn test_upsert_replaces_same_type() {
        let mut conditions = Vec::new();
        let first = new_condition(
            RESOURCES_AVAILABLE,
            ConditionStatus::False,
            "SyncFailed",
            "boom",
            1,
            at(0),
        );
        assert!(upsert_condition(&mut conditions, first));

        let second = synced(2, at(10));
        assert!(upsert_condition(&mut conditions, second));

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].observed_generation, Some(2));
        assert_eq!(conditions[0].last_transition_time, "1970-01-01T00:00:10Z");
    }

    #[test]
    fn test_upsert_keeps_transition_time_when_status_unchanged() {
        let mut conditions = Vec::new();
        upsert_condition(&mut conditions, synced(1, at(0)));

        let changed = upsert_condition(&mut conditions, synced(2, at(50)));
        assert!(changed);
        assert_eq!(conditions[0].observed_generation, Some(2));
        assert_eq!(conditions[0].last_transition_time, "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_upsert_reports_no_change() {
        let mut conditions = Vec::new();
        upsert_condition(&mut conditions, synced(1, at(0)));
        let changed = upsert_condition(&mut conditions, synced(1, at(99)));
        assert!(!changed);
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_upsert_leaves_other_types_alone() {
        let mut conditions = vec![new_condition(
            "Ready",
            ConditionStatus::Unknown,
            "",
            "",
            1,
            at(0),
        )];
        upsert_condition(&mut conditions, synced(1, at(0)));
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].r#type, "Ready");
    }
}
