//! Operator-toggled runtime settings, persisted next to the task file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stasher_core::error::Result;
use tokio::sync::Mutex;

use crate::store::write_atomic;

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Settings {
    /// Run the incoming-grant detector on each poll tick.
    #[serde(default)]
    pub monitoring_enabled: bool,
}

pub struct SettingsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!("⚠️ Failed to create settings dir {}: {e}", dir.display());
        }
        Self {
            path: dir.join(SETTINGS_FILE),
            lock: Mutex::new(()),
        }
    }

    /// Read settings. Absent or corrupt files are replaced with the defaults.
    pub async fn load(&self) -> Settings {
        let _guard = self.lock.lock().await;
        self.load_or_init()
    }

    /// Flip monitoring and persist. Returns the new value.
    pub async fn set_monitoring(&self, enabled: bool) -> Result<Settings> {
        let _guard = self.lock.lock().await;
        let mut settings = self.load_or_init();
        settings.monitoring_enabled = enabled;
        self.write(&settings)?;
        tracing::info!(
            "⚙️ Monitoring {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(settings)
    }

    fn load_or_init(&self) -> Settings {
        let parsed = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|json| serde_json::from_str::<Settings>(&json).ok());
        match parsed {
            Some(settings) => settings,
            None => {
                let settings = Settings::default();
                if let Err(e) = self.write(&settings) {
                    tracing::warn!("⚠️ Failed to write default settings: {e}");
                }
                settings
            }
        }
    }

    fn write(&self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_string_pretty(settings)?;
        write_atomic(&self.path, &json)
    }
}
