//! Scheduler Engine: drives open tasks through PENDING → DELEGATED → EXECUTED.
//!
//! Each tick consolidates the earliest open windows into one interval and
//! issues at most one gateway action for it. Nothing is marked until the
//! gateway reports success, so a failed call is simply retried next tick.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset};
use stasher_core::types::sun_to_trx;
use stasher_core::{DelegationGateway, StasherConfig};
use tokio::sync::Mutex;

use crate::merge::{Interval, Phase, consolidate};
use crate::notify::Notification;
use crate::tasks::DelegationTask;

const SOURCE: &str = "scheduler";

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Task flags changed; the caller must persist.
    pub changed: bool,
    pub notifications: Vec<Notification>,
}

impl TickOutcome {
    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }
}

/// The window merge scheduler.
pub struct DelegationScheduler {
    gateway: Arc<dyn DelegationGateway>,
    owner: String,
    target: String,
    slice_gap: Duration,
    /// Ids of records with contradictory flags already reported to the operators.
    quarantined: Mutex<HashSet<String>>,
}

impl DelegationScheduler {
    pub fn new(
        gateway: Arc<dyn DelegationGateway>,
        owner: impl Into<String>,
        target: impl Into<String>,
        slice_gap: Duration,
    ) -> Self {
        Self {
            gateway,
            owner: owner.into(),
            target: target.into(),
            slice_gap,
            quarantined: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_config(config: &StasherConfig, gateway: Arc<dyn DelegationGateway>) -> Self {
        Self::new(
            gateway,
            config.account.owner_address.clone(),
            config.account.target_address.clone(),
            config.scheduler.slice_gap(),
        )
    }

    /// Run one step of the state machine over the whole collection.
    /// Gateway failures are reported in the outcome, never returned.
    pub async fn tick(&self, tasks: &mut [DelegationTask], now: DateTime<FixedOffset>) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        self.report_quarantined(tasks, &mut outcome).await;

        let Some(interval) = consolidate(tasks, self.slice_gap) else {
            return outcome;
        };

        // Scan everything, not just the interval, so a delegation left over
        // from an earlier interval shape is still seen and reclaimed.
        let active = tasks.iter().any(DelegationTask::is_active_delegation);

        match interval.phase(now) {
            Phase::Waiting => {}
            Phase::Open => self.open(tasks, &interval, active, &mut outcome).await,
            Phase::Closed => self.close(tasks, &interval, active, &mut outcome).await,
        }

        outcome
    }

    /// Records with contradictory flags are left out of consolidation.
    /// Each one is reported once; the rest of the collection keeps running.
    async fn report_quarantined(&self, tasks: &[DelegationTask], outcome: &mut TickOutcome) {
        let mut reported = self.quarantined.lock().await;
        for task in tasks.iter().filter(|t| !t.executed && !t.flags_consistent()) {
            if reported.insert(task.id.clone()) {
                outcome.notify(Notification::error(
                    "Task skipped",
                    &format!(
                        "Task {} is marked returned but was never delegated. It is ignored until deleted.",
                        task.id
                    ),
                    SOURCE,
                ));
            } else {
                tracing::debug!("Skipping inconsistent task {}", task.id);
            }
        }
    }

    async fn open(
        &self,
        tasks: &mut [DelegationTask],
        interval: &Interval,
        active: bool,
        outcome: &mut TickOutcome,
    ) {
        if active {
            let tx_id = tasks
                .iter()
                .find(|t| t.is_active_delegation())
                .and_then(|t| t.delegate_tx_id.clone());
            outcome.changed |= mark_delegated(tasks, interval, tx_id.as_deref());
            return;
        }

        tracing::info!(
            "⏳ Interval {} → {} open ({} task(s)), delegating",
            interval.start,
            interval.end,
            interval.members.len()
        );

        let max_sun = match self.gateway.max_delegatable(&self.owner).await {
            Ok(sun) => sun,
            Err(e) => {
                outcome.notify(Notification::error(
                    "Scheduled delegation failed",
                    &format!("Could not query delegatable amount: {e}. Retrying next tick."),
                    SOURCE,
                ));
                return;
            }
        };

        let amount = sun_to_trx(max_sun);
        if amount == 0 {
            outcome.changed |= mark_delegated(tasks, interval, None);
            outcome.notify(Notification::warn(
                "Scheduled delegation skipped",
                "Nothing to delegate: no free TRX on the owner account.",
                SOURCE,
            ));
            return;
        }

        match self.gateway.delegate(&self.owner, &self.target, amount).await {
            Ok(tx_id) => {
                outcome.changed |= mark_delegated(tasks, interval, Some(&tx_id));
                outcome.notify(Notification::info(
                    "Scheduled delegation done",
                    &format!("Delegated {amount} TRX to {}\nTXID: {tx_id}", self.target),
                    SOURCE,
                ));
            }
            Err(e) => {
                outcome.notify(Notification::error(
                    "Scheduled delegation failed",
                    &format!("{e}. Retrying next tick."),
                    SOURCE,
                ));
            }
        }
    }

    async fn close(
        &self,
        tasks: &mut [DelegationTask],
        interval: &Interval,
        active: bool,
        outcome: &mut TickOutcome,
    ) {
        if active {
            tracing::info!(
                "⏳ Interval {} → {} elapsed, reclaiming",
                interval.start,
                interval.end
            );

            let active_sun = match self.gateway.active_delegation(&self.owner, &self.target).await
            {
                Ok(sun) => sun,
                Err(e) => {
                    outcome.notify(Notification::error(
                        "Scheduled return failed",
                        &format!("Could not query active delegation: {e}. Retrying next tick."),
                        SOURCE,
                    ));
                    return;
                }
            };

            let amount = sun_to_trx(active_sun);
            if amount == 0 {
                outcome.changed |= mark_returned(tasks, interval, None);
                outcome.notify(Notification::warn(
                    "Scheduled return skipped",
                    "Delegation is already gone, nothing to reclaim.",
                    SOURCE,
                ));
            } else {
                match self.gateway.undelegate(&self.owner, &self.target, amount).await {
                    Ok(tx_id) => {
                        outcome.changed |= mark_returned(tasks, interval, Some(&tx_id));
                        outcome.notify(Notification::info(
                            "Scheduled return done",
                            &format!("Reclaimed {amount} TRX from {}\nTXID: {tx_id}", self.target),
                            SOURCE,
                        ));
                    }
                    Err(e) => {
                        outcome.notify(Notification::error(
                            "Scheduled return failed",
                            &format!("{e}. Retrying next tick."),
                            SOURCE,
                        ));
                        return;
                    }
                }
            }
        } else if interval.members.iter().any(|&i| !tasks[i].delegated) {
            outcome.notify(Notification::warn(
                "Interval closed without delegation",
                &format!(
                    "Window {} → {} elapsed before a delegation went through.",
                    interval.start, interval.end
                ),
                SOURCE,
            ));
        }

        outcome.changed |= mark_executed(tasks, interval);
    }
}

fn mark_delegated(tasks: &mut [DelegationTask], interval: &Interval, tx_id: Option<&str>) -> bool {
    let mut changed = false;
    for &i in &interval.members {
        let task = &mut tasks[i];
        if !task.delegated {
            task.delegated = true;
            changed = true;
        }
        if task.delegate_tx_id.is_none() {
            if let Some(tx) = tx_id {
                task.delegate_tx_id = Some(tx.to_string());
                changed = true;
            }
        }
    }
    changed
}

/// Marks the interval returned. The reclaim also took back any stray active
/// delegation outside the interval, so those tasks go back to pending and are
/// delegated again when their own window opens.
fn mark_returned(tasks: &mut [DelegationTask], interval: &Interval, tx_id: Option<&str>) -> bool {
    let mut changed = false;
    for (i, task) in tasks.iter_mut().enumerate() {
        if task.executed {
            continue;
        }
        if interval.contains(i) {
            if !task.returned {
                task.delegated = true;
                task.returned = true;
                task.return_tx_id = tx_id.map(str::to_string);
                changed = true;
            }
        } else if task.is_active_delegation() {
            tracing::info!("↩️ Task {} was reclaimed early, back to pending", task.id);
            task.delegated = false;
            task.delegate_tx_id = None;
            task.return_tx_id = None;
            changed = true;
        }
    }
    changed
}

fn mark_executed(tasks: &mut [DelegationTask], interval: &Interval) -> bool {
    let mut changed = false;
    for &i in &interval.members {
        let task = &mut tasks[i];
        if !task.executed {
            task.delegated = true;
            task.returned = true;
            task.executed = true;
            changed = true;
        }
    }
    changed
}
