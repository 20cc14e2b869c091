//! Incoming-grant detector: turns energy delegated *to* the owner account
//! into a scheduled window that later re-delegates it to the stash target.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset};
use stasher_core::config::MonitorConfig;
use stasher_core::{FeedTransaction, ResourceKind, StasherConfig, TransactionFeed};

use crate::notify::Notification;
use crate::tasks::DelegationTask;

const SOURCE: &str = "detector";

/// Result of one detection pass.
#[derive(Debug, Default)]
pub struct DetectOutcome {
    /// Number of tasks appended.
    pub added: usize,
    pub notifications: Vec<Notification>,
}

/// Self-throttling incoming-grant detector.
pub struct GrantDetector {
    feed: Arc<dyn TransactionFeed>,
    account: String,
    config: MonitorConfig,
    offset: FixedOffset,
    last_run: Option<DateTime<FixedOffset>>,
}

impl GrantDetector {
    pub fn new(
        feed: Arc<dyn TransactionFeed>,
        account: impl Into<String>,
        config: MonitorConfig,
        offset: FixedOffset,
    ) -> Self {
        Self {
            feed,
            account: account.into(),
            config,
            offset,
            last_run: None,
        }
    }

    pub fn from_config(
        config: &StasherConfig,
        feed: Arc<dyn TransactionFeed>,
        offset: FixedOffset,
    ) -> Self {
        Self::new(
            feed,
            config.account.owner_address.clone(),
            config.monitor.clone(),
            offset,
        )
    }

    /// True once `check_interval_secs` have passed since the last run.
    pub fn is_due(&self, now: DateTime<FixedOffset>) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now - last >= Duration::seconds(self.config.check_interval_secs as i64),
        }
    }

    /// Fetch the feed and append tasks for new grants. Skips when not yet due.
    pub async fn run(
        &mut self,
        tasks: &mut Vec<DelegationTask>,
        now: DateTime<FixedOffset>,
    ) -> DetectOutcome {
        if !self.is_due(now) {
            return DetectOutcome::default();
        }
        self.last_run = Some(now);

        match self
            .feed
            .recent_transactions(&self.account, self.config.batch_size)
            .await
        {
            Ok(transactions) => self.ingest(&transactions, tasks, now),
            Err(e) => {
                let mut outcome = DetectOutcome::default();
                outcome.notifications.push(Notification::error(
                    "Grant monitoring failed",
                    &format!("Transaction feed error: {e}"),
                    SOURCE,
                ));
                outcome
            }
        }
    }

    /// Turn a feed batch into new tasks, skipping duplicates and late detections.
    pub fn ingest(
        &self,
        transactions: &[FeedTransaction],
        tasks: &mut Vec<DelegationTask>,
        now: DateTime<FixedOffset>,
    ) -> DetectOutcome {
        let mut outcome = DetectOutcome::default();
        let grace = Duration::seconds(self.config.late_grace_secs);

        for tx in transactions {
            if !tx.is_grant_to(&self.account, ResourceKind::Energy) {
                continue;
            }
            if tasks
                .iter()
                .any(|t| t.source_tx_id.as_deref() == Some(tx.hash.as_str()))
            {
                continue;
            }

            let Some(granted_at) = DateTime::from_timestamp_millis(tx.timestamp_ms) else {
                tracing::warn!("⚠️ Skipping {}: bad timestamp {}", tx.hash, tx.timestamp_ms);
                continue;
            };
            let schedule_time =
                granted_at.with_timezone(&self.offset) + Duration::seconds(self.config.pre_delay_secs);

            if schedule_time < now - grace {
                outcome.notifications.push(Notification::warn(
                    "Late grant skipped",
                    &format!(
                        "Grant {} would have been stashed at {}, which already passed.",
                        tx.hash,
                        schedule_time.format("%Y-%m-%d %H:%M:%S")
                    ),
                    SOURCE,
                ));
                continue;
            }

            let task = DelegationTask::with_hold(schedule_time, Duration::seconds(self.config.hold_secs))
                .from_source(tx.hash.clone());
            outcome.notifications.push(Notification::info(
                "Grant detected",
                &format!(
                    "Incoming energy from {} ({}).\nStash {} → {}",
                    tx.owner.as_deref().unwrap_or("unknown"),
                    tx.hash,
                    task.schedule_time.format("%Y-%m-%d %H:%M:%S"),
                    task.return_time.format("%Y-%m-%d %H:%M:%S"),
                ),
                SOURCE,
            ));
            tasks.push(task);
            outcome.added += 1;
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFeed;
    use chrono::TimeZone;
    use stasher_core::types::DELEGATE_CONTRACT;

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn now() -> DateTime<FixedOffset> {
        offset().with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn grant(hash: &str, at: DateTime<FixedOffset>) -> FeedTransaction {
        FeedTransaction {
            hash: hash.into(),
            timestamp_ms: at.timestamp_millis(),
            contract_type: DELEGATE_CONTRACT.into(),
            owner: Some("TGrantor".into()),
            receiver: Some("TOwner".into()),
            resource: Some(ResourceKind::Energy),
        }
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            check_interval_secs: 60,
            pre_delay_secs: 120,
            hold_secs: 600,
            batch_size: 20,
            late_grace_secs: 30,
        }
    }

    fn detector(feed: MockFeed) -> (GrantDetector, Arc<MockFeed>) {
        let feed = Arc::new(feed);
        (GrantDetector::new(feed.clone(), "TOwner", config(), offset()), feed)
    }

    #[test]
    fn test_ingest_computes_window() {
        let (det, _) = detector(MockFeed::default());
        let mut tasks = Vec::new();
        let out = det.ingest(&[grant("h1", now())], &mut tasks, now());

        assert_eq!(out.added, 1);
        assert_eq!(tasks[0].source_tx_id.as_deref(), Some("h1"));
        assert_eq!(tasks[0].schedule_time, now() + Duration::minutes(2));
        assert_eq!(tasks[0].return_time, now() + Duration::minutes(12));
        assert!(!tasks[0].delegated);
    }

    #[test]
    fn test_ingest_dedups_same_hash() {
        let (det, _) = detector(MockFeed::default());
        let mut tasks = Vec::new();
        let batch = [grant("h1", now()), grant("h1", now())];
        det.ingest(&batch, &mut tasks, now());
        det.ingest(&batch, &mut tasks, now());
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_ingest_skips_late_detection() {
        let (det, _) = detector(MockFeed::default());
        let mut tasks = Vec::new();
        // schedule = now - 10m + 2m = now - 8m, far outside the 30s grace
        let out = det.ingest(&[grant("old", now() - Duration::minutes(10))], &mut tasks, now());
        assert_eq!(out.added, 0);
        assert!(tasks.is_empty());
        assert_eq!(out.notifications.len(), 1);

        // schedule = now - 20s, inside the grace window
        let out = det.ingest(
            &[grant("recent", now() - Duration::seconds(140))],
            &mut tasks,
            now(),
        );
        assert_eq!(out.added, 1);
    }

    #[test]
    fn test_ingest_ignores_other_transactions() {
        let (det, _) = detector(MockFeed::default());
        let mut tasks = Vec::new();

        let mut to_someone_else = grant("a", now());
        to_someone_else.receiver = Some("TOther".into());
        let mut bandwidth = grant("b", now());
        bandwidth.resource = Some(ResourceKind::Bandwidth);
        let mut transfer = grant("c", now());
        transfer.contract_type = "TransferContract".into();

        let out = det.ingest(&[to_someone_else, bandwidth, transfer], &mut tasks, now());
        assert_eq!(out.added, 0);
    }

    #[tokio::test]
    async fn test_run_is_throttled() {
        let (mut det, feed) = detector(MockFeed::with(vec![grant("h1", now())]));
        let mut tasks = Vec::new();

        assert_eq!(det.run(&mut tasks, now()).await.added, 1);
        det.run(&mut tasks, now() + Duration::seconds(30)).await;
        assert_eq!(feed.calls(), 1);

        det.run(&mut tasks, now() + Duration::seconds(60)).await;
        assert_eq!(feed.calls(), 2);
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_feed_failure_reported() {
        let feed = MockFeed::default();
        *feed.fail.lock().unwrap() = true;
        let (mut det, _) = detector(feed);
        let mut tasks = Vec::new();

        let out = det.run(&mut tasks, now()).await;
        assert_eq!(out.added, 0);
        assert!(out.notifications[0].is_failure());
    }
}
