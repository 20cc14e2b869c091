//! Poll loop. One cooperative driver runs the detector (when enabled), then the scheduler,
//! then persists and sleeps. Ticks never overlap.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use futures::FutureExt;

use crate::detector::GrantDetector;
use crate::dispatch::{NotifyTarget, dispatch_all};
use crate::engine::DelegationScheduler;
use crate::notify::{Notification, NotifyRouter};
use crate::settings::SettingsStore;
use crate::store::TaskStore;

const SOURCE: &str = "poll";

/// Everything one tick needs.
pub struct PollLoop {
    store: Arc<TaskStore>,
    settings: Arc<SettingsStore>,
    scheduler: DelegationScheduler,
    detector: GrantDetector,
    offset: FixedOffset,
    pub router: NotifyRouter,
}

impl PollLoop {
    pub fn new(
        store: Arc<TaskStore>,
        settings: Arc<SettingsStore>,
        scheduler: DelegationScheduler,
        detector: GrantDetector,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            settings,
            scheduler,
            detector,
            offset,
            router: NotifyRouter::new(),
        }
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// One full load → detect → schedule → save cycle at `now`.
    /// Returns every notification raised, already recorded in the router.
    /// A failed save is reported the same way, after whatever the tick did on-chain.
    pub async fn tick_at(&mut self, now: DateTime<FixedOffset>) -> Vec<Notification> {
        let settings = self.settings.load().await;
        let mut guard = self.store.lock().await;
        let mut notifications = Vec::new();
        let mut changed = false;

        if settings.monitoring_enabled {
            let detected = self.detector.run(&mut guard.tasks, now).await;
            changed |= detected.added > 0;
            notifications.extend(detected.notifications);
        }

        let scheduled = self.scheduler.tick(&mut guard.tasks, now).await;
        changed |= scheduled.changed;
        notifications.extend(scheduled.notifications);

        if changed {
            if let Err(e) = guard.save() {
                notifications.push(Notification::error(
                    "Task store write failed",
                    &format!("{e}. This tick's changes are not on disk."),
                    SOURCE,
                ));
            }
        }
        drop(guard);

        for n in &notifications {
            self.router.record(n.clone());
        }
        notifications
    }

    pub async fn tick(&mut self) -> Vec<Notification> {
        let now = self.now();
        self.tick_at(now).await
    }
}

/// Spawn-able forever loop. Errors and panics inside a tick are logged and the
/// loop carries on with the next tick.
pub async fn run_poll_loop(mut poll: PollLoop, targets: Vec<NotifyTarget>, interval_secs: u64) {
    tracing::info!("⏰ Poll loop started (tick every {}s)", interval_secs);

    let client = reqwest::Client::new();
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let result = AssertUnwindSafe(poll.tick()).catch_unwind().await;
        let notifications = match result {
            Ok(notifications) => notifications,
            Err(_) => {
                let n = Notification::error("Poll tick panicked", "See logs for details.", SOURCE);
                poll.router.record(n.clone());
                vec![n]
            }
        };

        for n in &notifications {
            dispatch_all(&client, n, &targets).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::DelegationTask;
    use crate::testing::{MockFeed, MockGateway};
    use chrono::{Duration, TimeZone};
    use stasher_core::config::MonitorConfig;
    use stasher_core::types::DELEGATE_CONTRACT;
    use stasher_core::{FeedTransaction, ResourceKind, SUN_PER_TRX};

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn t0() -> DateTime<FixedOffset> {
        offset().with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<TaskStore>,
        settings: Arc<SettingsStore>,
        gateway: Arc<MockGateway>,
        feed: Arc<MockFeed>,
        poll: PollLoop,
    }

    fn fixture(feed: MockFeed) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::new(dir.path()));
        let settings = Arc::new(SettingsStore::new(dir.path()));
        let gateway = Arc::new(MockGateway::with_balance(100 * SUN_PER_TRX));
        let feed = Arc::new(feed);
        let scheduler =
            DelegationScheduler::new(gateway.clone(), "TOwner", "TTarget", Duration::minutes(2));
        let detector =
            GrantDetector::new(feed.clone(), "TOwner", MonitorConfig::default(), offset());
        let poll = PollLoop::new(store.clone(), settings.clone(), scheduler, detector, offset());
        Fixture {
            _dir: dir,
            store,
            settings,
            gateway,
            feed,
            poll,
        }
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

    #[tokio::test]
    async fn test_tick_persists_delegation() {
        let mut fx = fixture(MockFeed::default());
        fx.store
            .save(&[DelegationTask::new(t0(), t0() + Duration::minutes(10))])
            .unwrap();

        fx.poll.tick_at(t0()).await;
        let tasks = fx.store.load();
        assert!(tasks[0].delegated);
        assert_eq!(fx.gateway.delegates(), 1);
        assert_eq!(fx.poll.router.history().len(), 1);
    }

    #[tokio::test]
    async fn test_idle_tick_does_not_write() {
        let mut fx = fixture(MockFeed::default());
        fx.poll.tick_at(t0()).await;
        assert!(!fx.store.file().exists());
    }

    #[tokio::test]
    async fn test_detector_only_runs_when_enabled() {
        let mut fx = fixture(MockFeed::with(vec![grant("h1", t0())]));
        fx.poll.tick_at(t0()).await;
        assert_eq!(fx.feed.calls(), 0);
        assert!(fx.store.load().is_empty());

        fx.settings.set_monitoring(true).await.unwrap();
        fx.poll.tick_at(t0()).await;
        assert_eq!(fx.feed.calls(), 1);
        let tasks = fx.store.load();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].source_tx_id.as_deref(), Some("h1"));
    }

    #[tokio::test]
    async fn test_detected_task_runs_full_cycle() {
        let mut fx = fixture(MockFeed::with(vec![grant("h1", t0())]));
        fx.settings.set_monitoring(true).await.unwrap();

        fx.poll.tick_at(t0()).await;
        let tasks = fx.store.load();
        let start = tasks[0].schedule_time;
        let end = tasks[0].return_time;

        fx.poll.tick_at(start).await;
        fx.poll.tick_at(end).await;

        let tasks = fx.store.load();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].executed);
        assert_eq!(fx.gateway.delegates(), 1);
        assert_eq!(fx.gateway.undelegates(), 1);
    }

    #[tokio::test]
    async fn test_inconsistent_task_keeps_detections_and_their_notices() {
        let mut fx = fixture(MockFeed::with(vec![grant("h1", t0())]));
        fx.settings.set_monitoring(true).await.unwrap();
        let mut bad = DelegationTask::new(t0(), t0() + Duration::minutes(10));
        bad.returned = true;
        fx.store.save(&[bad]).unwrap();

        let notifications = fx.poll.tick_at(t0()).await;
        assert!(notifications.iter().any(|n| n.title == "Grant detected"));
        assert!(notifications.iter().any(|n| n.title == "Task skipped"));
        assert_eq!(fx.poll.router.history().len(), notifications.len());
        assert_eq!(fx.store.load().len(), 2);
        assert_eq!(fx.gateway.queries(), 0);
    }

    #[tokio::test]
    async fn test_failed_save_still_reports_chain_actions() {
        let mut fx = fixture(MockFeed::default());
        fx.store
            .save(&[DelegationTask::new(t0(), t0() + Duration::minutes(10))])
            .unwrap();
        // A directory in the temp file's place makes the atomic write fail.
        std::fs::create_dir(fx.store.file().with_extension("json.tmp")).unwrap();

        let notifications = fx.poll.tick_at(t0()).await;
        assert_eq!(fx.gateway.delegates(), 1);
        assert!(notifications.iter().any(|n| n.title == "Scheduled delegation done"));
        assert!(
            notifications
                .iter()
                .any(|n| n.title == "Task store write failed" && n.is_failure())
        );
        assert!(!fx.store.load()[0].delegated);
    }
}
