//! Sliding-window rate limiting and spam-streak blocking.
//!
//! Two defenses share one per-user record:
//! - a trailing 24-hour cap on confirmed submissions, and
//! - a streak detector: submissions each landing within a short window of
//!   the previous one build a streak; reaching the limit sets a temporary
//!   block.
//!
//! ## Design
//! - Admission checks are side-effect-free, so the same gate runs at form
//!   start and again at final confirmation without double-counting.
//! - Submissions are recorded exactly once, after the confirmed hand-off
//!   to the staff channel.
//! - Records are created lazily per user and never deleted.

use std::collections::HashMap;

/// Trailing window for the submission cap.
const WINDOW_SECS: u64 = 24 * 3600;

/// Current epoch seconds.
fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Why an admission check turned a user away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// A spam block is active; carries the whole minutes left.
    Blocked { minutes_left: u64 },
    /// The trailing 24-hour cap is reached.
    WindowCap { max: usize },
}

impl Denial {
    /// User-facing wording.
    pub fn message(&self) -> String {
        match self {
            Self::Blocked { minutes_left } => format!(
                "⛔ Sei temporaneamente bloccato per spam. Riprova tra circa {minutes_left} minuti."
            ),
            Self::WindowCap { max } => {
                format!("⛔ Hai raggiunto il limite: massimo {max} richieste ogni 24 ore.")
            }
        }
    }
}

/// Per-user limiter record.
#[derive(Debug, Clone, Default)]
struct LimitRecord {
    /// Epoch seconds of confirmed submissions inside the trailing window.
    submission_times: Vec<u64>,
    /// Consecutive submissions each within the spam window of the previous.
    streak: u32,
    /// Epoch seconds of the most recent confirmed submission.
    last_submission: Option<u64>,
    /// Epoch seconds until which the user is blocked.
    blocked_until: Option<u64>,
}

/// Sliding-window limiter with streak-based temporary blocking.
pub struct RateLimiter {
    records: HashMap<i64, LimitRecord>,
    max_submissions: usize,
    spam_window_secs: u64,
    streak_limit: u32,
    block_secs: u64,
}

impl RateLimiter {
    pub fn new(
        max_submissions: usize,
        spam_window_secs: u64,
        streak_limit: u32,
        block_secs: u64,
    ) -> Self {
        Self {
            records: HashMap::new(),
            max_submissions,
            spam_window_secs,
            streak_limit,
            block_secs,
        }
    }

    /// Admission check. Side-effect-free beyond lazy record creation and
    /// pruning, so it can run both at form start and at confirmation.
    pub fn try_admit(&mut self, user_id: i64) -> Result<(), Denial> {
        self.try_admit_at(user_id, now_secs())
    }

    fn try_admit_at(&mut self, user_id: i64, now: u64) -> Result<(), Denial> {
        let record = self.records.entry(user_id).or_default();

        if let Some(until) = record.blocked_until {
            if now < until {
                return Err(Denial::Blocked {
                    minutes_left: (until - now) / 60,
                });
            }
        }

        let cutoff = now.saturating_sub(WINDOW_SECS);
        record.submission_times.retain(|&t| t >= cutoff);
        if record.submission_times.len() >= self.max_submissions {
            return Err(Denial::WindowCap {
                max: self.max_submissions,
            });
        }
        Ok(())
    }

    /// Record one confirmed submission. Called exactly once per ticket,
    /// after the staff hand-off succeeded.
    pub fn record_submission(&mut self, user_id: i64) {
        self.record_submission_at(user_id, now_secs());
    }

    fn record_submission_at(&mut self, user_id: i64, now: u64) {
        let record = self.records.entry(user_id).or_default();

        let cutoff = now.saturating_sub(WINDOW_SECS);
        record.submission_times.retain(|&t| t >= cutoff);
        record.submission_times.push(now);

        record.streak = match record.last_submission {
            Some(last) if now.saturating_sub(last) <= self.spam_window_secs => record.streak + 1,
            _ => 1,
        };
        record.last_submission = Some(now);

        if record.streak >= self.streak_limit {
            record.blocked_until = Some(now + self.block_secs);
        }
    }

    /// Number of users with a record.
    pub fn tracked_users(&self) -> usize {
        self.records.len()
    }
}
