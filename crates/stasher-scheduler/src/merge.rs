//! Window consolidation: folds near-adjacent task windows into one interval
//! so a run of tasks is served by a single delegate/undelegate pair.

use chrono::{DateTime, Duration, FixedOffset};

use crate::tasks::DelegationTask;

/// The merged window currently due, built from the earliest open tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// Indices into the task slice, in schedule order.
    pub members: Vec<usize>,
}

/// Where `now` falls relative to an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    Open,
    Closed,
}

impl Interval {
    pub fn phase(&self, now: DateTime<FixedOffset>) -> Phase {
        if now < self.start {
            Phase::Waiting
        } else if now < self.end {
            Phase::Open
        } else {
            Phase::Closed
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.members.contains(&index)
    }
}

/// Build the current interval from the non-executed tasks. Records with
/// contradictory flags are skipped.
///
/// Starts at the earliest schedule time and absorbs every following task
/// whose schedule time is within `slice_gap` of the running end. The first
/// task beyond the gap ends the scan; it is picked up on a later tick.
pub fn consolidate(tasks: &[DelegationTask], slice_gap: Duration) -> Option<Interval> {
    let mut open: Vec<usize> = (0..tasks.len())
        .filter(|&i| !tasks[i].executed && tasks[i].flags_consistent())
        .collect();
    open.sort_by_key(|&i| tasks[i].schedule_time);

    let (&first, rest) = open.split_first()?;
    let mut interval = Interval {
        start: tasks[first].schedule_time,
        end: tasks[first].return_time,
        members: vec![first],
    };

    for &i in rest {
        let task = &tasks[i];
        if task.schedule_time > interval.end + slice_gap {
            break;
        }
        interval.end = interval.end.max(task.return_time);
        interval.members.push(i);
    }

    Some(interval)
}
