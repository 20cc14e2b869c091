//! Telegram Bot client: long polling + message sending via Bot API.

use serde::{Deserialize, Serialize};
use stasher_core::error::{Result, StasherError};

/// Telegram Bot client with an update offset cursor.
pub struct TelegramClient {
    bot_token: String,
    client: reqwest::Client,
    last_update_id: i64,
}

/// Keyboard attached to an outgoing message.
#[derive(Debug, Clone, PartialEq)]
pub enum Keyboard {
    /// Persistent reply keyboard, rows of button labels.
    Reply(Vec<Vec<String>>),
    /// Inline buttons, rows of (label, callback data).
    Inline(Vec<Vec<(String, String)>>),
}

impl Keyboard {
    fn to_markup(&self) -> serde_json::Value {
        match self {
            Keyboard::Reply(rows) => serde_json::json!({
                "keyboard": rows
                    .iter()
                    .map(|row| row.iter().map(|label| serde_json::json!({"text": label})).collect::<Vec<_>>())
                    .collect::<Vec<_>>(),
                "resize_keyboard": true,
                "one_time_keyboard": false,
            }),
            Keyboard::Inline(rows) => serde_json::json!({
                "inline_keyboard": rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|(label, data)| serde_json::json!({"text": label, "callback_data": data}))
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>(),
            }),
        }
    }
}

impl TelegramClient {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            client: reqwest::Client::new(),
            last_update_id: 0,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| StasherError::Channel(format!("Telegram {method} failed: {e}")))?;

        let body: TelegramApiResponse<T> = response
            .json()
            .await
            .map_err(|e| StasherError::Channel(format!("Invalid Telegram {method} response: {e}")))?;

        if !body.ok {
            return Err(StasherError::Channel(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }
        body.result
            .ok_or_else(|| StasherError::Channel(format!("Telegram {method}: empty result")))
    }

    /// Get updates using long polling.
    pub async fn get_updates(&mut self) -> Result<Vec<TelegramUpdate>> {
        let body = serde_json::json!({
            "offset": self.last_update_id + 1,
            "timeout": 30,
            "allowed_updates": ["message", "callback_query"],
        });
        let updates: Vec<TelegramUpdate> = self.call("getUpdates", &body).await?;
        if let Some(last) = updates.last() {
            self.last_update_id = last.update_id;
        }
        Ok(updates)
    }

    /// Send a Markdown message, optionally with a keyboard.
    pub async fn send_message(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = kb.to_markup();
        }
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    /// Clear the spinner on a pressed inline button.
    pub async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let body = serde_json::json!({ "callback_query_id": callback_id });
        let _: serde_json::Value = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let body = serde_json::json!({ "chat_id": chat_id, "message_id": message_id });
        let _: serde_json::Value = self.call("deleteMessage", &body).await?;
        Ok(())
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        self.call("getMe", &serde_json::json!({})).await
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    pub message: Option<TelegramMessage>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

/// An update reduced to what the operator handler needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Text {
        chat_id: i64,
        user_id: i64,
        text: String,
    },
    Button {
        callback_id: String,
        chat_id: i64,
        user_id: i64,
        message_id: Option<i64>,
        data: String,
    },
}

impl TelegramUpdate {
    pub fn to_incoming(&self) -> Option<Incoming> {
        if let Some(cb) = &self.callback_query {
            let msg = cb.message.as_ref()?;
            return Some(Incoming::Button {
                callback_id: cb.id.clone(),
                chat_id: msg.chat.id,
                user_id: cb.from.id,
                message_id: Some(msg.message_id),
                data: cb.data.clone()?,
            });
        }

        let msg = self.message.as_ref()?;
        let from = msg.from.as_ref()?;
        // Skip bot messages
        if from.is_bot {
            return None;
        }
        Some(Incoming::Text {
            chat_id: msg.chat.id,
            user_id: from.id,
            text: msg.text.clone()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_update() {
        let json = r#"{"update_id":7,"message":{"message_id":1,"from":{"id":42,"is_bot":false,"first_name":"Op"},
            "chat":{"id":42,"type":"private"},"text":"Stash 📤","date":0}}"#;
        let update: TelegramUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(
            update.to_incoming(),
            Some(Incoming::Text { chat_id: 42, user_id: 42, text: "Stash 📤".into() })
        );
    }

    #[test]
    fn test_callback_update() {
        let json = r#"{"update_id":8,"callback_query":{"id":"cb1","from":{"id":42,"is_bot":false,"first_name":"Op"},
            "message":{"message_id":5,"chat":{"id":-100,"type":"group"},"date":0},"data":"cancel"}}"#;
        let update: TelegramUpdate = serde_json::from_str(json).unwrap();
        match update.to_incoming() {
            Some(Incoming::Button { chat_id, user_id, data, message_id, .. }) => {
                assert_eq!(chat_id, -100);
                assert_eq!(user_id, 42);
                assert_eq!(message_id, Some(5));
                assert_eq!(data, "cancel");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bot_messages_skipped() {
        let json = r#"{"update_id":9,"message":{"message_id":1,"from":{"id":1,"is_bot":true,"first_name":"Bot"},
            "chat":{"id":1,"type":"private"},"text":"hi","date":0}}"#;
        let update: TelegramUpdate = serde_json::from_str(json).unwrap();
        assert!(update.to_incoming().is_none());
    }

    #[test]
    fn test_inline_markup() {
        let kb = Keyboard::Inline(vec![vec![("Yes".into(), "confirm".into())]]);
        let markup = kb.to_markup();
        assert_eq!(markup["inline_keyboard"][0][0]["callback_data"], "confirm");

        let kb = Keyboard::Reply(vec![vec!["A".into(), "B".into()]]);
        assert_eq!(kb.to_markup()["keyboard"][0][1]["text"], "B");
    }
}
