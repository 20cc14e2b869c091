//! Notification dispatch: actually sends notifications to the operators.
//! Supports: Telegram Bot API (one target per admin chat), HTTP webhook.

use super::notify::{Notification, NotifyPriority};

/// Notification target configuration.
#[derive(Debug, Clone)]
pub enum NotifyTarget {
    /// Telegram Bot API: send via `sendMessage`.
    Telegram { bot_token: String, chat_id: i64 },
    /// Generic HTTP webhook: POST with JSON body.
    Webhook { url: String },
}

/// Dispatch a notification to a target channel.
/// Returns Ok(()) on success, Err(reason) on failure.
pub async fn dispatch(
    client: &reqwest::Client,
    notification: &Notification,
    target: &NotifyTarget,
) -> Result<(), String> {
    match target {
        NotifyTarget::Telegram { bot_token, chat_id } => {
            send_telegram(client, bot_token, *chat_id, notification).await
        }
        NotifyTarget::Webhook { url } => send_webhook(client, url, notification).await,
    }
}

/// Render a notification as a Telegram Markdown message.
pub fn telegram_text(notification: &Notification) -> String {
    let priority_emoji = match notification.priority {
        NotifyPriority::Urgent => "❌",
        NotifyPriority::High => "⚠️",
        NotifyPriority::Normal => "✅",
        NotifyPriority::Low => "ℹ️",
    };
    format!(
        "{} *{}*\n\n{}\n\n_{} • {}_",
        priority_emoji,
        escape_markdown(&notification.title),
        escape_markdown(&notification.body),
        escape_markdown(&notification.source),
        notification.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Send notification via Telegram Bot API.
async fn send_telegram(
    client: &reqwest::Client,
    bot_token: &str,
    chat_id: i64,
    notification: &Notification,
) -> Result<(), String> {
    let url = format!("https://api.telegram.org/bot{}/sendMessage", bot_token);
    let resp = client
        .post(&url)
        .json(&serde_json::json!({
            "chat_id": chat_id,
            "text": telegram_text(notification),
            "parse_mode": "Markdown"
        }))
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| format!("Telegram send failed: {e}"))?;

    if resp.status().is_success() {
        tracing::debug!("📨 Telegram notification sent to {chat_id}: {}", notification.title);
        Ok(())
    } else {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(format!("Telegram API error {status}: {body}"))
    }
}

/// Send notification via generic HTTP webhook.
async fn send_webhook(
    client: &reqwest::Client,
    url: &str,
    notification: &Notification,
) -> Result<(), String> {
    let resp = client
        .post(url)
        .json(&serde_json::json!({
            "title": notification.title,
            "body": notification.body,
            "priority": format!("{:?}", notification.priority),
            "source": notification.source,
            "timestamp": notification.timestamp.to_rfc3339(),
        }))
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| format!("Webhook send failed: {e}"))?;

    if resp.status().is_success() {
        tracing::debug!("📨 Webhook notification sent to {}: {}", url, notification.title);
        Ok(())
    } else {
        Err(format!("Webhook error {}", resp.status()))
    }
}

/// Escape Telegram MarkdownV1 special characters.
pub fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

/// Dispatch to every target. Failures are logged, never propagated.
pub async fn dispatch_all(
    client: &reqwest::Client,
    notification: &Notification,
    targets: &[NotifyTarget],
) {
    for target in targets {
        if let Err(e) = dispatch(client, notification, target).await {
            tracing::warn!("⚠️ Notification dispatch failed: {e}");
        }
    }
}

/// Build targets from config: every admin chat, plus the webhook if set.
pub fn targets_from_config(config: &stasher_core::StasherConfig) -> Vec<NotifyTarget> {
    let mut targets = Vec::new();

    if config.telegram.enabled && !config.telegram.bot_token.is_empty() {
        for chat_id in &config.telegram.admin_ids {
            targets.push(NotifyTarget::Telegram {
                bot_token: config.telegram.bot_token.clone(),
                chat_id: *chat_id,
            });
        }
    }

    if !config.telegram.notify_webhook_url.is_empty() {
        targets.push(NotifyTarget::Webhook {
            url: config.telegram.notify_webhook_url.clone(),
        });
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c[d`"), "a\\_b\\*c\\[d\\`");
    }

    #[test]
    fn test_telegram_text_has_title_and_body() {
        let n = Notification::error("Scheduled return failed", "tx_1 rejected", "scheduler");
        let text = telegram_text(&n);
        assert!(text.starts_with("❌ *Scheduled return failed*"));
        assert!(text.contains("tx\\_1 rejected"));
    }

    #[test]
    fn test_targets_from_config() {
        let mut config = stasher_core::StasherConfig::default();
        assert!(targets_from_config(&config).is_empty());

        config.telegram.bot_token = "123:abc".into();
        config.telegram.admin_ids = vec![1, 2];
        config.telegram.notify_webhook_url = "http://hooks.local/stasher".into();
        let targets = targets_from_config(&config);
        assert_eq!(targets.len(), 3);
        assert!(matches!(targets[0], NotifyTarget::Telegram { chat_id: 1, .. }));
        assert!(matches!(targets[2], NotifyTarget::Webhook { .. }));
    }
}
