//! Operator command handling: admin-only chat commands over the shared stores.
//!
//! Handlers return [`Reply`] values instead of sending, so the transport loop
//! in [`run_operator`] stays thin and the handlers can be tested directly.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use futures::FutureExt;
use stasher_core::error::Result;
use stasher_core::types::sun_to_trx;
use stasher_core::{DelegationGateway, StasherConfig};
use stasher_scheduler::dispatch::escape_markdown;
use stasher_scheduler::{DelegationTask, SettingsStore, TaskState, TaskStore};

use crate::dialog::{Dialog, Step, TIME_FORMAT, format_offset};
use crate::telegram::{Incoming, Keyboard, TelegramClient};

pub const BTN_STASH: &str = "Stash 📤";
pub const BTN_RECLAIM: &str = "Reclaim 📥";
pub const BTN_SCHEDULE: &str = "Schedule ⏳";
pub const BTN_SHOW: &str = "Show scheduled 📋";
pub const BTN_DELETE: &str = "Delete scheduled ❌";
pub const BTN_MONITOR: &str = "Monitoring 🔍";

const CB_DELETE_TASK: &str = "del:";
const CB_DELETE_ALL: &str = "confirm_delete_all";
const CB_CANCEL: &str = "cancel";

/// One outgoing message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub chat_id: i64,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl Reply {
    fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            keyboard: None,
        }
    }

    /// Error text is Markdown-escaped so Telegram accepts the message.
    fn failure(chat_id: i64, what: &str, err: &dyn std::fmt::Display) -> Self {
        Self::text(chat_id, format!("❌ {what}: {}", escape_markdown(&err.to_string())))
    }

    fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

pub fn main_keyboard() -> Keyboard {
    Keyboard::Reply(vec![
        vec![BTN_STASH.into(), BTN_RECLAIM.into(), BTN_SCHEDULE.into()],
        vec![BTN_SHOW.into(), BTN_DELETE.into(), BTN_MONITOR.into()],
    ])
}

/// Operator-side state: who may talk to the bot and which dialogs are open.
pub struct Operator {
    store: Arc<TaskStore>,
    settings: Arc<SettingsStore>,
    gateway: Arc<dyn DelegationGateway>,
    admin_ids: Vec<i64>,
    owner: String,
    target: String,
    offset: FixedOffset,
    dialogs: HashMap<i64, Dialog>,
}

impl Operator {
    pub fn new(
        config: &StasherConfig,
        store: Arc<TaskStore>,
        settings: Arc<SettingsStore>,
        gateway: Arc<dyn DelegationGateway>,
    ) -> Result<Self> {
        Ok(Self {
            store,
            settings,
            gateway,
            admin_ids: config.telegram.admin_ids.clone(),
            owner: config.account.owner_address.clone(),
            target: config.account.target_address.clone(),
            offset: config.scheduler.offset()?,
            dialogs: HashMap::new(),
        })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Handle a text message. An open dialog takes every non-button message.
    pub async fn handle_text(&mut self, chat_id: i64, user_id: i64, text: &str) -> Vec<Reply> {
        let now = self.now();
        self.handle_text_at(chat_id, user_id, text, now).await
    }

    pub async fn handle_text_at(
        &mut self,
        chat_id: i64,
        user_id: i64,
        text: &str,
        now: DateTime<FixedOffset>,
    ) -> Vec<Reply> {
        if !self.is_admin(user_id) {
            tracing::warn!("⛔ Rejected message from non-admin {user_id}");
            return vec![Reply::text(chat_id, "⛔ You don't have access")];
        }

        let text = text.trim();
        match text {
            "/start" => {
                self.dialogs.remove(&chat_id);
                vec![Reply::text(chat_id, self.banner()).with_keyboard(main_keyboard())]
            }
            "/cancel" => {
                let had = self.dialogs.remove(&chat_id).is_some();
                vec![Reply::text(
                    chat_id,
                    if had { "✅ Scheduling cancelled." } else { "Nothing to cancel." },
                )]
            }
            BTN_STASH => {
                self.dialogs.remove(&chat_id);
                self.stash_now(chat_id).await
            }
            BTN_RECLAIM => {
                self.dialogs.remove(&chat_id);
                self.reclaim_now(chat_id).await
            }
            BTN_SCHEDULE => {
                self.dialogs.insert(chat_id, Dialog::AwaitingScheduleTime);
                vec![Reply::text(chat_id, Dialog::prompt(&self.offset))]
            }
            BTN_SHOW => {
                self.dialogs.remove(&chat_id);
                vec![self.task_list(chat_id).await]
            }
            BTN_DELETE => {
                self.dialogs.remove(&chat_id);
                vec![self.confirm_delete_all(chat_id).await]
            }
            BTN_MONITOR => {
                self.dialogs.remove(&chat_id);
                vec![self.toggle_monitoring(chat_id).await]
            }
            _ => match self.dialogs.remove(&chat_id) {
                Some(dialog) => self.continue_dialog(chat_id, dialog, text, now).await,
                None => vec![Reply::text(chat_id, "Use the keyboard below.").with_keyboard(main_keyboard())],
            },
        }
    }

    /// Handle an inline button press.
    pub async fn handle_button(&mut self, chat_id: i64, user_id: i64, data: &str) -> Vec<Reply> {
        if !self.is_admin(user_id) {
            return vec![Reply::text(chat_id, "⛔ You don't have access")];
        }

        if data == CB_CANCEL {
            return vec![Reply::text(chat_id, "✅ Cancelled.")];
        }

        if data == CB_DELETE_ALL {
            let removed = self
                .store
                .mutate(|tasks| {
                    let before = tasks.len();
                    tasks.retain(|t| t.executed);
                    let removed = before - tasks.len();
                    (removed, removed > 0)
                })
                .await;
            return match removed {
                Ok(0) => vec![Reply::text(chat_id, "✅ No active tasks to delete.")],
                Ok(n) => {
                    tracing::info!("🗑️ Operator {user_id} deleted all {n} active task(s)");
                    vec![Reply::text(chat_id, format!("🗑️ Deleted all {n} active task(s)."))]
                }
                Err(e) => vec![Reply::failure(chat_id, "Delete failed", &e)],
            };
        }

        if let Some(id) = data.strip_prefix(CB_DELETE_TASK) {
            let removed = self
                .store
                .mutate(|tasks| {
                    let before = tasks.len();
                    tasks.retain(|t| t.executed || t.id != id);
                    let removed = tasks.len() < before;
                    (removed, removed)
                })
                .await;
            return match removed {
                Ok(true) => {
                    tracing::info!("🗑️ Operator {user_id} deleted task {id}");
                    vec![
                        Reply::text(chat_id, "🗑️ Task deleted."),
                        self.task_list(chat_id).await,
                    ]
                }
                Ok(false) => vec![Reply::text(chat_id, "❌ Task not found.")],
                Err(e) => vec![Reply::failure(chat_id, "Delete failed", &e)],
            };
        }

        vec![Reply::text(chat_id, "❌ Unknown action.")]
    }

    fn banner(&self) -> String {
        format!(
            "🤖 Energy Stasher\n\nOwner: `{}`\nStash target: `{}`\nTimes are UTC{}.\n\nAddresses come from the config file and cannot be changed from chat.",
            self.owner,
            self.target,
            format_offset(&self.offset)
        )
    }

    async fn stash_now(&self, chat_id: i64) -> Vec<Reply> {
        let max_sun = match self.gateway.max_delegatable(&self.owner).await {
            Ok(sun) => sun,
            Err(e) => {
                tracing::error!("❌ Manual stash: query failed: {e}");
                return vec![Reply::text(chat_id, "❌ Could not query the delegatable amount. Check the logs.")];
            }
        };
        let amount = sun_to_trx(max_sun);
        if amount == 0 {
            return vec![Reply::text(
                chat_id,
                "✅ Nothing to delegate. Everything is already stashed or there is no free TRX.",
            )];
        }

        match self.gateway.delegate(&self.owner, &self.target, amount).await {
            Ok(tx_id) => vec![Reply::text(
                chat_id,
                format!("✅ Stashed!\n\nDelegated: {amount} TRX\nTo: `{}`\nTXID: `{tx_id}`", self.target),
            )],
            Err(e) => {
                tracing::error!("❌ Manual stash failed: {e}");
                vec![Reply::text(chat_id, "❌ Delegation failed. Check the logs.")]
            }
        }
    }

    async fn reclaim_now(&self, chat_id: i64) -> Vec<Reply> {
        let active_sun = match self.gateway.active_delegation(&self.owner, &self.target).await {
            Ok(sun) => sun,
            Err(e) => {
                tracing::error!("❌ Manual reclaim: query failed: {e}");
                return vec![Reply::text(chat_id, "❌ Could not fetch active delegations. Check the logs.")];
            }
        };
        let amount = sun_to_trx(active_sun);
        if amount == 0 {
            return vec![Reply::text(chat_id, "✅ No active delegation to the stash target.")];
        }

        match self.gateway.undelegate(&self.owner, &self.target, amount).await {
            Ok(tx_id) => vec![Reply::text(
                chat_id,
                format!("✅ Reclaimed!\n\nReturned: {amount} TRX\nFrom: `{}`\nTXID: `{tx_id}`", self.target),
            )],
            Err(e) => {
                tracing::error!("❌ Manual reclaim failed: {e}");
                vec![Reply::text(chat_id, "❌ Reclaim failed. Check the logs.")]
            }
        }
    }

    async fn continue_dialog(
        &mut self,
        chat_id: i64,
        dialog: Dialog,
        text: &str,
        now: DateTime<FixedOffset>,
    ) -> Vec<Reply> {
        match dialog.advance(text, &self.offset, now) {
            Step::Next(next, prompt) | Step::Retry(next, prompt) => {
                self.dialogs.insert(chat_id, next);
                vec![Reply::text(chat_id, prompt)]
            }
            Step::Done {
                schedule_time,
                return_time,
                source_tx_id,
            } => {
                let mut task = DelegationTask::new(schedule_time, return_time);
                task.source_tx_id = source_tx_id;
                let hold = task.hold_minutes();
                let created = self
                    .store
                    .mutate(|tasks| {
                        let duplicate = task.source_tx_id.is_some()
                            && tasks.iter().any(|t| t.source_tx_id == task.source_tx_id);
                        if duplicate {
                            (false, false)
                        } else {
                            tasks.push(task);
                            (true, true)
                        }
                    })
                    .await;
                match created {
                    Ok(true) => {
                        tracing::info!("📅 Task scheduled: {schedule_time} → {return_time}");
                        vec![Reply::text(
                            chat_id,
                            format!(
                                "✅ Task scheduled!\nDelegate: {}\nReturn after {hold} min → {} (UTC{})",
                                schedule_time.format(TIME_FORMAT),
                                return_time.format(TIME_FORMAT),
                                format_offset(&self.offset)
                            ),
                        )]
                    }
                    Ok(false) => vec![Reply::text(
                        chat_id,
                        "❌ A task for that source transaction already exists.",
                    )],
                    Err(e) => vec![Reply::failure(chat_id, "Could not save task", &e)],
                }
            }
        }
    }

    async fn task_list(&self, chat_id: i64) -> Reply {
        let tasks = self.store.snapshot().await;
        let active: Vec<&DelegationTask> = tasks.iter().filter(|t| !t.executed).collect();
        if active.is_empty() {
            return Reply::text(chat_id, "✅ No active scheduled tasks.");
        }

        let mut output = format!("📜 *Active scheduled tasks (UTC{}):*\n\n", format_offset(&self.offset));
        let mut rows = Vec::new();
        for (i, task) in active.iter().enumerate() {
            let status = match task.state() {
                TaskState::Pending => " (waiting to delegate)",
                TaskState::Delegated => " (stashed, waiting to return)",
                TaskState::Executed => "",
            };
            let source = task
                .source_tx_id
                .as_deref()
                .map(|s| format!("Source: `{}…`\n", s.chars().take(12).collect::<String>()))
                .unwrap_or_default();
            output.push_str(&format!(
                "*Task #{}*{}\nDelegate at: `{}`\nReturn at: `{}`\n{}----\n",
                i + 1,
                status,
                task.schedule_time.with_timezone(&self.offset).format(TIME_FORMAT),
                task.return_time.with_timezone(&self.offset).format(TIME_FORMAT),
                source,
            ));
            rows.push(vec![(
                format!("❌ Delete task #{}", i + 1),
                format!("{CB_DELETE_TASK}{}", task.id),
            )]);
        }
        rows.push(vec![("🗑️ Delete ALL active".into(), CB_DELETE_ALL.into())]);

        Reply::text(chat_id, output).with_keyboard(Keyboard::Inline(rows))
    }

    async fn confirm_delete_all(&self, chat_id: i64) -> Reply {
        let count = self.store.snapshot().await.iter().filter(|t| !t.executed).count();
        if count == 0 {
            return Reply::text(chat_id, "✅ No active scheduled tasks to delete.");
        }
        Reply::text(
            chat_id,
            format!(
                "⚠️ *WARNING!* Delete ALL {count} active scheduled task(s)?\n\n_This does not undo a delegation that already happened, but it stops the scheduled return._"
            ),
        )
        .with_keyboard(Keyboard::Inline(vec![vec![
            ("✅ Yes, delete ALL".into(), CB_DELETE_ALL.into()),
            ("❌ No, cancel".into(), CB_CANCEL.into()),
        ]]))
    }

    async fn toggle_monitoring(&self, chat_id: i64) -> Reply {
        let current = self.settings.load().await;
        match self.settings.set_monitoring(!current.monitoring_enabled).await {
            Ok(s) if s.monitoring_enabled => {
                Reply::text(chat_id, "🔍 Incoming-grant monitoring is now *ON*.")
            }
            Ok(_) => Reply::text(chat_id, "🔍 Incoming-grant monitoring is now *OFF*."),
            Err(e) => Reply::failure(chat_id, "Could not save settings", &e),
        }
    }
}

/// Long-poll Telegram and feed updates to the operator until the process exits.
/// A panic while handling one update is logged and that update is dropped.
pub async fn run_operator(mut client: TelegramClient, mut operator: Operator, poll_interval_secs: u64) {
    match client.get_me().await {
        Ok(me) => tracing::info!(
            "🤖 Telegram bot: @{} ({})",
            me.username.as_deref().unwrap_or("unknown"),
            me.first_name
        ),
        Err(e) => tracing::warn!("⚠️ Telegram getMe failed: {e}"),
    }

    loop {
        match client.get_updates().await {
            Ok(updates) => {
                for update in updates {
                    let Some(incoming) = update.to_incoming() else {
                        continue;
                    };
                    let handled = AssertUnwindSafe(handle_incoming(&client, &mut operator, incoming))
                        .catch_unwind()
                        .await;
                    if handled.is_err() {
                        tracing::error!("💥 Operator handler panicked on update {}", update.update_id);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Telegram polling error: {e}");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }

        tokio::time::sleep(std::time::Duration::from_secs(poll_interval_secs)).await;
    }
}

async fn handle_incoming(client: &TelegramClient, operator: &mut Operator, incoming: Incoming) {
    let replies = match incoming {
        Incoming::Text { chat_id, user_id, text } => operator.handle_text(chat_id, user_id, &text).await,
        Incoming::Button {
            callback_id,
            chat_id,
            user_id,
            message_id,
            data,
        } => {
            if let Err(e) = client.answer_callback(&callback_id).await {
                tracing::debug!("answerCallbackQuery failed: {e}");
            }
            if let Some(message_id) = message_id {
                // The pressed list/confirmation is stale either way.
                let _ = client.delete_message(chat_id, message_id).await;
            }
            operator.handle_button(chat_id, user_id, &data).await
        }
    };
    for reply in replies {
        if let Err(e) = client
            .send_message(reply.chat_id, &reply.text, reply.keyboard.as_ref())
            .await
        {
            tracing::warn!("⚠️ Could not send message to {}: {e}", reply.chat_id);
        }
    }
}
