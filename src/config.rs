//! Environment-driven configuration.
//!
//! All settings come from environment variables so the bot can run on any
//! container platform without a config file. Required settings fail fast at
//! startup, before any state or network connection exists.

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;

/// Confirmed submissions allowed per user in a trailing 24 hours.
const DEFAULT_MAX_REQUESTS_24H: usize = 3;

/// Two submissions closer together than this feed the spam streak.
const DEFAULT_SPAM_WINDOW_MINUTES: u64 = 10;

/// Streak length that triggers a temporary block.
const DEFAULT_SPAM_STREAK_LIMIT: u32 = 3;

/// Duration of a spam block.
const DEFAULT_BLOCK_HOURS: u64 = 24;

/// Local hour (inclusive) from which /request is accepted.
const DEFAULT_REQUEST_START_HOUR: u32 = 10;

/// Local hour (exclusive) at which requests close.
const DEFAULT_REQUEST_END_HOUR: u32 = 21;

/// IANA timezone the request window is evaluated in.
const DEFAULT_TIMEZONE: &str = "Europe/Rome";

#[derive(Debug, Clone)]
pub struct Config {
    /// Bot token from @BotFather.
    pub bot_token: String,
    /// OpenAI API key for the ticket-card formatter.
    pub openai_api_key: String,
    /// Staff channel/group id (the `-100...` form).
    pub staff_chat_id: i64,
    /// Group whose members are allowed to use the bot.
    pub member_group_id: i64,
    pub request_start_hour: u32,
    pub request_end_hour: u32,
    pub timezone: Tz,
    pub max_requests_24h: usize,
    pub spam_window_secs: u64,
    pub spam_streak_limit: u32,
    pub block_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary lookup function (tests).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bot_token = required(&get, "TELEGRAM_BOT_TOKEN")?;
        let openai_api_key = required(&get, "OPENAI_API_KEY")?;
        let staff_chat_id = required(&get, "STAFF_CHAT_ID")?
            .parse::<i64>()
            .context("STAFF_CHAT_ID must be an integer like -100...")?;
        let member_group_id = required(&get, "MEMBER_GROUP_ID")?
            .parse::<i64>()
            .context("MEMBER_GROUP_ID must be an integer like -100...")?;

        let request_start_hour =
            optional(&get, "REQUEST_START_HOUR", DEFAULT_REQUEST_START_HOUR)?;
        let request_end_hour = optional(&get, "REQUEST_END_HOUR", DEFAULT_REQUEST_END_HOUR)?;
        if request_start_hour >= request_end_hour || request_end_hour > 24 {
            bail!(
                "request window {request_start_hour}..{request_end_hour} is not a valid hour range"
            );
        }

        let timezone_name =
            get("BOT_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|e| anyhow::anyhow!("BOT_TIMEZONE {timezone_name:?} is unknown: {e}"))?;

        let spam_window_minutes: u64 =
            optional(&get, "SPAM_WINDOW_MINUTES", DEFAULT_SPAM_WINDOW_MINUTES)?;
        let block_hours: u64 = optional(&get, "BLOCK_HOURS", DEFAULT_BLOCK_HOURS)?;

        Ok(Self {
            bot_token,
            openai_api_key,
            staff_chat_id,
            member_group_id,
            request_start_hour,
            request_end_hour,
            timezone,
            max_requests_24h: optional(&get, "MAX_REQUESTS_24H", DEFAULT_MAX_REQUESTS_24H)?,
            spam_window_secs: spam_window_minutes * 60,
            spam_streak_limit: optional(&get, "SPAM_STREAK_LIMIT", DEFAULT_SPAM_STREAK_LIMIT)?,
            block_secs: block_hours * 3600,
        })
    }
}

fn required(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    match get(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => bail!("Missing {key}"),
    }
}

fn optional<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} could not be parsed")),
        None => Ok(default),
    }
}
