//! Admission gates: the time-of-day window and the group-membership check.
//!
//! Both gates run before a form starts; the time gate runs again at final
//! confirmation (a form can sit open past closing time), and membership is
//! re-checked on every mid-flow text input since it can lapse while a form
//! is open.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::telegram::Transport;

/// Time-of-day admission window, evaluated in a configured timezone.
#[derive(Debug, Clone)]
pub struct TimeGate {
    timezone: Tz,
    start_hour: u32,
    end_hour: u32,
}

impl TimeGate {
    pub fn new(timezone: Tz, start_hour: u32, end_hour: u32) -> Self {
        Self {
            timezone,
            start_hour,
            end_hour,
        }
    }

    /// Whether requests are open right now.
    pub fn is_open(&self) -> bool {
        self.is_open_at(Utc::now().with_timezone(&self.timezone))
    }

    /// Whether requests are open at the given local instant. The window is
    /// inclusive of the opening hour, exclusive of the closing hour.
    pub fn is_open_at(&self, local: DateTime<Tz>) -> bool {
        let hour = local.hour();
        self.start_hour <= hour && hour < self.end_hour
    }

    /// Closed-hours wording shown to users.
    pub fn closed_message(&self) -> String {
        format!(
            "⏰ Le richieste sono attive dalle **{:02}:00 alle {:02}:00**.\nRiprova più tardi 🙏",
            self.start_hour, self.end_hour
        )
    }
}

/// Group-membership gate backed by the transport's member lookup.
#[derive(Debug, Clone)]
pub struct MembershipGuard {
    group_id: i64,
}

impl MembershipGuard {
    pub fn new(group_id: i64) -> Self {
        Self { group_id }
    }

    /// Whether the user belongs to the configured group. A lookup failure
    /// denies: a user the oracle cannot vouch for is treated as an
    /// outsider.
    pub async fn is_member<T: Transport + ?Sized>(&self, transport: &T, user_id: i64) -> bool {
        match transport.chat_member_status(self.group_id, user_id).await {
            Ok(status) => status.grants_access(),
            Err(err) => {
                warn!("membership lookup for user {user_id} failed: {err:#}");
                false
            }
        }
    }
}
