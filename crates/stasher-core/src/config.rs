//! Energy Stasher configuration system.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StasherError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StasherConfig {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub tron: TronConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl StasherConfig {
    /// Load config from the default path (~/.stasher/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StasherError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| StasherError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| StasherError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Stasher home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".stasher")
    }

    /// Overlay secrets from the environment. Env wins over the file.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("TRONGRID_API_KEY") {
            self.tron.trongrid_api_key = v;
        }
        if let Ok(v) = std::env::var("TRONSCAN_API_KEY") {
            self.tron.tronscan_api_key = v;
        }
        if let Ok(v) = std::env::var("STASHER_SIGNER_URL") {
            self.tron.signer_url = v;
        }
        if let Ok(v) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Ok(v) = std::env::var("STASHER_ADMIN_IDS") {
            match parse_admin_ids(&v) {
                Ok(ids) => self.telegram.admin_ids = ids,
                Err(e) => tracing::warn!("⚠️ Ignoring STASHER_ADMIN_IDS: {e}"),
            }
        }
    }

    /// Check everything the engine cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.account.owner_address.is_empty() {
            return Err(StasherError::Config("account.owner_address is required".into()));
        }
        if self.account.target_address.is_empty() {
            return Err(StasherError::Config("account.target_address is required".into()));
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err(StasherError::Config("scheduler.poll_interval_secs must be > 0".into()));
        }
        if self.monitor.hold_secs <= 0 {
            return Err(StasherError::Config("monitor.hold_secs must be > 0".into()));
        }
        if self.telegram.enabled && self.telegram.bot_token.is_empty() {
            return Err(StasherError::Config("telegram.bot_token is required when enabled".into()));
        }
        self.scheduler.offset()?;
        Ok(())
    }

    /// Directory holding tasks.json and settings.json, with `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.scheduler.data_dir).to_string())
    }
}

/// Parse a comma-separated list of chat ids.
pub fn parse_admin_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| StasherError::Config(format!("Invalid admin id: {s}")))
        })
        .collect()
}

/// The controlled account and the stash target.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccountConfig {
    /// Account that owns the staked TRX and signs delegations.
    #[serde(default)]
    pub owner_address: String,
    /// Account that receives the delegated energy.
    #[serde(default)]
    pub target_address: String,
    /// Active permission id used to sign (multi-sign setups).
    #[serde(default)]
    pub permission_id: u32,
}

/// TronGrid / TronScan endpoints and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TronConfig {
    #[serde(default = "default_trongrid_url")]
    pub trongrid_url: String,
    #[serde(default = "default_tronscan_url")]
    pub tronscan_url: String,
    #[serde(default)]
    pub trongrid_api_key: String,
    #[serde(default)]
    pub tronscan_api_key: String,
    /// External signer: receives an unsigned transaction, returns it signed.
    #[serde(default = "default_signer_url")]
    pub signer_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_trongrid_url() -> String { "https://api.trongrid.io".into() }
fn default_tronscan_url() -> String { "https://apilist.tronscanapi.com".into() }
fn default_signer_url() -> String { "http://127.0.0.1:8645/sign".into() }
fn default_request_timeout() -> u64 { 30 }

impl Default for TronConfig {
    fn default() -> Self {
        Self {
            trongrid_url: default_trongrid_url(),
            tronscan_url: default_tronscan_url(),
            trongrid_api_key: String::new(),
            tronscan_api_key: String::new(),
            signer_url: default_signer_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Poll loop and window merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Max idle gap between two task windows that still merge into one interval.
    #[serde(default = "default_slice_gap")]
    pub slice_gap_secs: i64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Offset operators enter local times in, e.g. 3 for UTC+3.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

fn default_poll_interval() -> u64 { 30 }
fn default_slice_gap() -> i64 { 120 }
fn default_data_dir() -> String { "~/.stasher/data".into() }
fn default_utc_offset() -> i32 { 3 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            slice_gap_secs: default_slice_gap(),
            data_dir: default_data_dir(),
            utc_offset_hours: default_utc_offset(),
        }
    }
}

impl SchedulerConfig {
    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            StasherError::Config(format!("Invalid utc_offset_hours: {}", self.utc_offset_hours))
        })
    }

    pub fn slice_gap(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.slice_gap_secs.max(0))
    }
}

/// Incoming-grant detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Time left to the grantor before the resource is re-delegated.
    #[serde(default = "default_pre_delay")]
    pub pre_delay_secs: i64,
    /// How long the detected window holds the delegation.
    #[serde(default = "default_hold")]
    pub hold_secs: i64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Detections older than this are skipped rather than backfilled.
    #[serde(default = "default_late_grace")]
    pub late_grace_secs: i64,
}

fn default_check_interval() -> u64 { 60 }
fn default_pre_delay() -> i64 { 120 }
fn default_hold() -> i64 { 600 }
fn default_batch_size() -> usize { 20 }
fn default_late_grace() -> i64 { 30 }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            pre_delay_secs: default_pre_delay(),
            hold_secs: default_hold(),
            batch_size: default_batch_size(),
            late_grace_secs: default_late_grace(),
        }
    }
}

/// Operator chat interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    /// Chats allowed to operate the bot; also receive notifications.
    #[serde(default)]
    pub admin_ids: Vec<i64>,
    #[serde(default = "default_tg_poll_interval")]
    pub poll_interval_secs: u64,
    /// Optional HTTP endpoint that also receives every notification.
    #[serde(default)]
    pub notify_webhook_url: String,
}

fn bool_true() -> bool { true }
fn default_tg_poll_interval() -> u64 { 1 }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: String::new(),
            admin_ids: Vec::new(),
            poll_interval_secs: default_tg_poll_interval(),
            notify_webhook_url: String::new(),
        }
    }
}
