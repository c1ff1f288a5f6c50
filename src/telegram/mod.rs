//! Telegram Bot API transport layer.
//!
//! Wire types for the small slice of the Bot API the bot consumes, the
//! [`Transport`] trait the dispatch layer talks to, and the inline keyboard
//! layouts. The HTTP implementation lives in [`client`].
//!
//! ## Design
//! - Long polling (`getUpdates`), not webhooks, so the bot runs anywhere
//!   with outbound connectivity and no public endpoint.
//! - The trait boundary keeps the core unit-testable with an in-memory fake.
//! - Wire structs carry only the fields the bot reads; everything else in
//!   the API payload is ignored on deserialization.

pub mod client;
pub mod keyboards;

pub use client::TelegramClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ── Wire types ───────────────────────────────────────────────────

/// One long-poll update envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// An incoming chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

/// The chat a message belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// A Telegram account.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    /// First and last name joined, trimmed.
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last).trim().to_string(),
            None => self.first_name.trim().to_string(),
        }
    }

    /// `@username` or `(no username)` for the staff card payload.
    pub fn username_tag(&self) -> String {
        match &self.username {
            Some(u) => format!("@{u}"),
            None => "(no username)".to_string(),
        }
    }

    /// Name plus `@username` where available, `Utente` when the account
    /// exposes neither.
    pub fn display_name(&self) -> String {
        let name = self.full_name();
        let display = match &self.username {
            Some(u) if name.is_empty() => format!("@{u}"),
            Some(u) => format!("{name} @{u}"),
            None => name,
        };
        if display.is_empty() {
            "Utente".to_string()
        } else {
            display
        }
    }
}

/// An inline-button press relayed by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// A user's standing inside a group, as reported by `getChatMember`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
    /// A status string this bot does not recognize.
    Other,
}

impl ChatMemberStatus {
    pub fn from_api(status: &str) -> Self {
        match status {
            "creator" => Self::Creator,
            "administrator" => Self::Administrator,
            "member" => Self::Member,
            "restricted" => Self::Restricted,
            "left" => Self::Left,
            "kicked" => Self::Kicked,
            _ => Self::Other,
        }
    }

    /// Whether this standing admits the user to the bot.
    pub fn grants_access(&self) -> bool {
        matches!(self, Self::Creator | Self::Administrator | Self::Member)
    }
}

// ── Inline keyboards ─────────────────────────────────────────────

/// Inline keyboard markup, serialized as Telegram's `reply_markup`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

/// One inline button carrying a callback payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        self.inline_keyboard.push(buttons);
        self
    }
}

/// Shorthand button constructor used by the keyboard layouts.
pub fn btn(text: &str, callback_data: &str) -> InlineButton {
    InlineButton {
        text: text.to_string(),
        callback_data: callback_data.to_string(),
    }
}

// ── Transport trait ──────────────────────────────────────────────

/// Outbound surface of the chat transport.
///
/// Every method is a single API call; failures bubble up as `anyhow`
/// errors and are absorbed by the dispatch layer, never by callers inside
/// the state machine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a message, optionally with an inline keyboard. Returns the
    /// id of the sent message.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> anyhow::Result<i64>;

    /// Replace a sent message's text and keyboard.
    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> anyhow::Result<()>;

    /// Replace (or with `None`, remove) a sent message's keyboard.
    async fn edit_reply_markup(
        &self,
        chat_id: i64,
        message_id: i64,
        keyboard: Option<&InlineKeyboard>,
    ) -> anyhow::Result<()>;

    /// Acknowledge an inline-button press so the client stops its spinner.
    async fn answer_callback(&self, callback_id: &str) -> anyhow::Result<()>;

    /// Resolve a user's standing in a group.
    async fn chat_member_status(&self, chat_id: i64, user_id: i64)
        -> anyhow::Result<ChatMemberStatus>;
}

// ── Test fake ────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: &str, last: Option<&str>, username: Option<&str>) -> User {
        User {
            id: 7,
            first_name: first.to_string(),
            last_name: last.map(str::to_string),
            username: username.map(str::to_string),
        }
    }

    #[test]
    fn display_name_prefers_full_name_and_username() {
        assert_eq!(
            user("Ada", Some("Lovelace"), Some("ada")).display_name(),
            "Ada Lovelace @ada"
        );
        assert_eq!(user("Ada", None, None).display_name(), "Ada");
        assert_eq!(user("", None, Some("ada")).display_name(), "@ada");
        assert_eq!(user("", None, None).display_name(), "Utente");
    }

    #[test]
    fn username_tag_marks_missing_username() {
        assert_eq!(user("Ada", None, Some("ada")).username_tag(), "@ada");
        assert_eq!(user("Ada", None, None).username_tag(), "(no username)");
    }

    #[test]
    fn member_status_maps_access() {
        assert!(ChatMemberStatus::from_api("member").grants_access());
        assert!(ChatMemberStatus::from_api("creator").grants_access());
        assert!(ChatMemberStatus::from_api("administrator").grants_access());
        assert!(!ChatMemberStatus::from_api("left").grants_access());
        assert!(!ChatMemberStatus::from_api("kicked").grants_access());
        assert!(!ChatMemberStatus::from_api("restricted").grants_access());
        assert!(!ChatMemberStatus::from_api("banana").grants_access());
    }

    #[test]
    fn keyboard_serializes_to_reply_markup_shape() {
        let kb = InlineKeyboard::new().row(vec![btn("Si", "yes"), btn("No", "no")]);
        let value = serde_json::to_value(&kb).unwrap();
        assert_eq!(value["inline_keyboard"][0][1]["callback_data"], "no");
    }
}
