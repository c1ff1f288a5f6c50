//! Raw HTTP client for the Telegram Bot API.
//!
//! Every call posts JSON to `https://api.telegram.org/bot<token>/<method>`
//! and unwraps the API envelope (`ok` / `description`). Failures surface as
//! `anyhow` errors; the dispatch layer decides what to absorb.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{ChatMemberStatus, InlineKeyboard, Transport, Update};

/// Telegram Bot API host.
const API_BASE: &str = "https://api.telegram.org";

/// Timeout for ordinary (non-polling) API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Slack added to the HTTP timeout on top of the long-poll timeout.
const POLL_TIMEOUT_SLACK_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
}

/// Bot API client. Cloning shares the underlying connection pool.
#[derive(Clone)]
pub struct TelegramClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(API_BASE.to_string(), token)
    }

    /// Point the client at a different host (tests).
    pub fn with_base_url(base_url: String, token: String) -> Self {
        Self {
            base_url,
            token,
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let resp = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("telegram {method} request failed"))?;

        let envelope: ApiEnvelope<T> = resp
            .json()
            .await
            .with_context(|| format!("telegram {method} response was not json"))?;

        if !envelope.ok {
            bail!(
                "telegram {method} rejected: {}",
                envelope.description.unwrap_or_else(|| "no description".into())
            );
        }
        envelope
            .result
            .with_context(|| format!("telegram {method} returned ok without a result"))
    }

    /// Long-poll for updates starting at `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let timeout = Duration::from_secs(timeout_secs + POLL_TIMEOUT_SLACK_SECS);
        self.call("getUpdates", body, timeout).await
    }

    /// Drop whatever backlog accumulated while the bot was down and return
    /// the next offset to poll from.
    pub async fn drain_backlog(&self) -> Result<i64> {
        // offset -1 asks only for the most recent pending update.
        let updates = self.get_updates(-1, 0).await?;
        Ok(updates.last().map(|u| u.update_id + 1).unwrap_or(0))
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<i64> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(kb) = keyboard {
            body["reply_markup"] = serde_json::to_value(kb)?;
        }
        let sent: SentMessage = self.call("sendMessage", body, REQUEST_TIMEOUT).await?;
        Ok(sent.message_id)
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = serde_json::to_value(kb)?;
        }
        self.call::<serde_json::Value>("editMessageText", body, REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn edit_reply_markup(
        &self,
        chat_id: i64,
        message_id: i64,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        let mut body = json!({ "chat_id": chat_id, "message_id": message_id });
        if let Some(kb) = keyboard {
            body["reply_markup"] = serde_json::to_value(kb)?;
        }
        self.call::<serde_json::Value>("editMessageReplyMarkup", body, REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let body = json!({ "callback_query_id": callback_id });
        self.call::<serde_json::Value>("answerCallbackQuery", body, REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn chat_member_status(&self, chat_id: i64, user_id: i64) -> Result<ChatMemberStatus> {
        let body = json!({ "chat_id": chat_id, "user_id": user_id });
        let member: ChatMember = self.call("getChatMember", body, REQUEST_TIMEOUT).await?;
        Ok(ChatMemberStatus::from_api(&member.status))
    }
}
