//! File-based task store: the whole collection lives in one JSON file.
//! Saves go through a temp file + rename so a reader never sees a half-written list.
//! Every writer goes through [`TaskStore::lock`], which serializes load-modify-save cycles
//! within the process and, through an advisory `tasks.lock` file, across processes.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use stasher_core::error::{Result, StasherError};
use tokio::sync::{Mutex, MutexGuard};

use crate::tasks::DelegationTask;

const TASKS_FILE: &str = "tasks.json";
const LOCK_FILE: &str = "tasks.lock";

/// File-based task store.
pub struct TaskStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TaskStore {
    /// Create a new task store at the given directory.
    pub fn new(dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!("⚠️ Failed to create store dir {}: {e}", dir.display());
        }
        Self {
            path: dir.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Default store directory (~/.stasher/data).
    pub fn default_path() -> PathBuf {
        stasher_core::StasherConfig::home_dir().join("data")
    }

    pub fn file(&self) -> PathBuf {
        self.path.join(TASKS_FILE)
    }

    /// Save all tasks to disk, replacing the previous collection.
    pub fn save(&self, tasks: &[DelegationTask]) -> Result<()> {
        let json = serde_json::to_string_pretty(tasks)?;
        write_atomic(&self.file(), &json)?;
        tracing::debug!("💾 Saved {} tasks to {}", tasks.len(), self.file().display());
        Ok(())
    }

    /// Load tasks from disk. Missing or corrupt files read as empty.
    pub fn load(&self) -> Vec<DelegationTask> {
        let file = self.file();
        if !file.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&file) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {}: {e}", file.display());
                Vec::new()
            }),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read {}: {e}", file.display());
                Vec::new()
            }
        }
    }

    /// Take the writer lock and load the current collection.
    pub async fn lock(&self) -> StoreGuard<'_> {
        let guard = self.lock.lock().await;
        let file_lock = self.lock_file().await;
        StoreGuard {
            tasks: self.load(),
            store: self,
            _file_lock: file_lock,
            _guard: guard,
        }
    }

    /// Block (off the runtime) until no other process holds `tasks.lock`.
    /// The lock is released when the returned file is dropped.
    async fn lock_file(&self) -> Option<File> {
        let path = self.path.join(LOCK_FILE);
        let acquired = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await;

        match acquired {
            Ok(Ok(file)) => Some(file),
            Ok(Err(e)) => {
                tracing::warn!("⚠️ Could not lock {}: {e}", self.path.join(LOCK_FILE).display());
                None
            }
            Err(e) => {
                tracing::warn!("⚠️ Store lock task failed: {e}");
                None
            }
        }
    }

    /// Load-modify-save in one locked step. The closure returns whether it changed anything.
    pub async fn mutate<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<DelegationTask>) -> (R, bool),
    {
        let mut guard = self.lock().await;
        let (out, changed) = f(&mut guard.tasks);
        if changed {
            guard.save()?;
        }
        Ok(out)
    }

    /// Consistent read of the collection.
    pub async fn snapshot(&self) -> Vec<DelegationTask> {
        self.lock().await.tasks
    }
}

/// Exclusive access to the collection for one load-modify-save cycle.
pub struct StoreGuard<'a> {
    pub tasks: Vec<DelegationTask>,
    store: &'a TaskStore,
    _file_lock: Option<File>,
    _guard: MutexGuard<'a, ()>,
}

impl StoreGuard<'_> {
    pub fn save(&self) -> Result<()> {
        self.store.save(&self.tasks)
    }
}

/// Write `content` next to `path` then rename over it.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)
        .map_err(|e| StasherError::Store(format!("Write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| StasherError::Store(format!("Rename to {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());
        std::fs::write(store.file(), "[{not json").unwrap();
        assert!(store.load().is_empty());

        // Self-heals on the next save.
        store
            .save(&[DelegationTask::new(
                ts("2026-03-01T10:00:00+03:00"),
                ts("2026-03-01T10:10:00+03:00"),
            )])
            .unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());

        let mut done = DelegationTask::new(
            ts("2026-03-01T10:00:00+03:00"),
            ts("2026-03-01T10:10:05+03:00"),
        );
        done.delegated = true;
        done.returned = true;
        done.executed = true;
        done.delegate_tx_id = Some("d1".into());
        done.return_tx_id = Some("r1".into());

        let detected = DelegationTask::new(
            ts("2026-03-02T07:00:00+00:00"),
            ts("2026-03-02T07:10:00+00:00"),
        )
        .from_source("feedhash");

        let tasks = vec![done, detected];
        store.save(&tasks).unwrap();
        let loaded = store.load();

        assert_eq!(loaded, tasks);
        assert_eq!(loaded[0].schedule_time.offset().local_minus_utc(), 3 * 3600);
        assert_eq!(loaded[1].schedule_time.offset().local_minus_utc(), 0);
        assert!(loaded[1].delegate_tx_id.is_none());
        assert!(!store.file().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_mutate_saves_only_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());

        store.mutate(|_| ((), false)).await.unwrap();
        assert!(!store.file().exists());

        let added = store
            .mutate(|tasks| {
                tasks.push(DelegationTask::new(
                    ts("2026-03-01T10:00:00+03:00"),
                    ts("2026-03-01T10:10:00+03:00"),
                ));
                (tasks.len(), true)
            })
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_file_lock_serializes_separate_stores() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = TaskStore::new(dir.path());
        let cli = std::sync::Arc::new(TaskStore::new(dir.path()));

        let mut guard = daemon.lock().await;
        let writer = {
            let cli = cli.clone();
            tokio::spawn(async move {
                cli.mutate(|tasks| {
                    tasks.push(DelegationTask::new(
                        ts("2026-03-01T12:00:00+03:00"),
                        ts("2026-03-01T12:10:00+03:00"),
                    ));
                    ((), true)
                })
                .await
            })
        };

        // The other store must not read the file until this cycle saves.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        guard.tasks.push(DelegationTask::new(
            ts("2026-03-01T10:00:00+03:00"),
            ts("2026-03-01T10:10:00+03:00"),
        ));
        guard.save().unwrap();
        drop(guard);

        writer.await.unwrap().unwrap();
        assert_eq!(daemon.load().len(), 2);
    }
}
