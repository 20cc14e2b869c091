//! Task definitions: one delegate-then-reclaim obligation per record.

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

/// A scheduled delegation window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelegationTask {
    /// Unique task ID.
    #[serde(default = "new_task_id")]
    pub id: String,
    /// Earliest instant the resource should be delegated.
    pub schedule_time: DateTime<FixedOffset>,
    /// Instant by which the resource must be reclaimed.
    pub return_time: DateTime<FixedOffset>,
    #[serde(default)]
    pub delegated: bool,
    #[serde(default)]
    pub returned: bool,
    /// Terminal. Retired tasks stay in the store for audit.
    #[serde(default)]
    pub executed: bool,
    #[serde(default)]
    pub delegate_tx_id: Option<String>,
    #[serde(default)]
    pub return_tx_id: Option<String>,
    /// Hash of the incoming grant that created this task (dedup key).
    #[serde(default)]
    pub source_tx_id: Option<String>,
}

/// Lifecycle position derived from the three flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Delegated,
    Executed,
}

impl DelegationTask {
    /// Create a pending task for `[schedule_time, return_time)`.
    pub fn new(schedule_time: DateTime<FixedOffset>, return_time: DateTime<FixedOffset>) -> Self {
        Self {
            id: new_task_id(),
            schedule_time,
            return_time,
            delegated: false,
            returned: false,
            executed: false,
            delegate_tx_id: None,
            return_tx_id: None,
            source_tx_id: None,
        }
    }

    /// Create a pending task that holds for `hold` after `schedule_time`.
    pub fn with_hold(schedule_time: DateTime<FixedOffset>, hold: Duration) -> Self {
        Self::new(schedule_time, schedule_time + hold)
    }

    /// Attach the grant transaction that triggered this task.
    pub fn from_source(mut self, source_tx_id: impl Into<String>) -> Self {
        self.source_tx_id = Some(source_tx_id.into());
        self
    }

    pub fn state(&self) -> TaskState {
        if self.executed {
            TaskState::Executed
        } else if self.delegated {
            TaskState::Delegated
        } else {
            TaskState::Pending
        }
    }

    /// Delegated and not yet reclaimed.
    pub fn is_active_delegation(&self) -> bool {
        self.delegated && !self.returned
    }

    /// `executed ⇒ delegated ∧ returned` and `returned ⇒ delegated`.
    pub fn flags_consistent(&self) -> bool {
        (!self.executed || (self.delegated && self.returned)) && (!self.returned || self.delegated)
    }

    pub fn hold_minutes(&self) -> i64 {
        (self.return_time - self.schedule_time).num_minutes()
    }
}

fn new_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 1, h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = DelegationTask::with_hold(at(10, 0), Duration::minutes(30));
        assert_eq!(task.state(), TaskState::Pending);
        assert_eq!(task.return_time, at(10, 30));
        assert_eq!(task.hold_minutes(), 30);
        assert!(task.flags_consistent());
        assert!(!task.id.is_empty());
    }

    #[test]
    fn test_state_progression() {
        let mut task = DelegationTask::new(at(10, 0), at(11, 0));
        task.delegated = true;
        assert_eq!(task.state(), TaskState::Delegated);
        assert!(task.is_active_delegation());

        task.returned = true;
        task.executed = true;
        assert_eq!(task.state(), TaskState::Executed);
        assert!(!task.is_active_delegation());
        assert!(task.flags_consistent());
    }

    #[test]
    fn test_inconsistent_flags_detected() {
        let mut task = DelegationTask::new(at(10, 0), at(11, 0));
        task.returned = true;
        assert!(!task.flags_consistent());
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = r#"{
            "schedule_time": "2026-03-01T10:00:00+03:00",
            "return_time": "2026-03-01T10:10:00+03:00",
            "executed": false,
            "delegated": false,
            "returned": false
        }"#;
        let task: DelegationTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.schedule_time, at(10, 0));
        assert!(task.delegate_tx_id.is_none());
        assert!(task.source_tx_id.is_none());
        assert!(!task.id.is_empty());
    }
}
