//! Ticket registry: staff-side lifecycle records for confirmed requests.
//!
//! ## Design
//! - Tickets are keyed by the id of the staff-channel message carrying the
//!   card, which is the identity staff buttons report back.
//! - Status only moves forward; terminal statuses accept no further
//!   transitions, so stale staff clicks are dropped.
//! - Per-user history is bounded to the last 20 entries, FIFO-evicted.
//! - Tickets are never deleted; request volume is interactive-human low.

pub mod staff;

pub use staff::{handle_staff_action, StaffAction};

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// History entries retained per user.
const HISTORY_LIMIT: usize = 20;

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    /// Just submitted, nobody has acted on it.
    New,
    /// A staffer is working on it.
    InProgress,
    /// Fulfilled.
    Done,
    /// Cannot be fulfilled right now.
    Unavailable,
    /// The content already exists; the requester should double-check.
    AlreadyPresent,
}

impl TicketStatus {
    /// Display label used on the staff card and in history.
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "Nuova",
            Self::InProgress => "🟡 Presa in carico",
            Self::Done => "🟢 Completata",
            Self::Unavailable => "🔴 Non Disponibile",
            Self::AlreadyPresent => "🟠 Già presente (controlla bene)",
        }
    }

    /// Terminal statuses accept no further staff transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Unavailable | Self::AlreadyPresent)
    }
}

/// One recorded content request and its staff-facing lifecycle state.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub staff_message_id: i64,
    pub user_id: i64,
    /// Chat to notify the requester in (their private chat with the bot).
    pub user_chat_id: i64,
    pub user_display: String,
    pub created_at: DateTime<Utc>,
    pub status: TicketStatus,
    pub assignee: Option<String>,
    pub closed_by: Option<String>,
    pub title: String,
    pub kind: String,
    pub year: String,
}

/// Bounded per-user summary of a past ticket.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub staff_message_id: i64,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub kind: String,
    pub year: String,
    pub status: TicketStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

/// In-memory registry of tickets, per-user history and the daily counter.
#[derive(Default)]
pub struct TicketRegistry {
    tickets: HashMap<i64, Ticket>,
    history: HashMap<i64, Vec<HistoryEntry>>,
    daily: HashMap<String, u32>,
}

impl TicketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly confirmed submission: the ticket, its history
    /// entry, and the daily counter. Returns today's submission count for
    /// the requester's ack message.
    pub fn open_ticket(
        &mut self,
        staff_message_id: i64,
        user_id: i64,
        user_chat_id: i64,
        user_display: String,
        title: String,
        kind: String,
        year: String,
    ) -> u32 {
        let created_at = Utc::now();
        self.tickets.insert(
            staff_message_id,
            Ticket {
                staff_message_id,
                user_id,
                user_chat_id,
                user_display,
                created_at,
                status: TicketStatus::New,
                assignee: None,
                closed_by: None,
                title: title.clone(),
                kind: kind.clone(),
                year: year.clone(),
            },
        );

        let entries = self.history.entry(user_id).or_default();
        entries.push(HistoryEntry {
            staff_message_id,
            created_at,
            title,
            kind,
            year,
            status: TicketStatus::New,
            updated_at: None,
        });
        if entries.len() > HISTORY_LIMIT {
            let excess = entries.len() - HISTORY_LIMIT;
            entries.drain(..excess);
        }

        let day = created_at.format("%Y-%m-%d").to_string();
        let count = self.daily.entry(day).or_insert(0);
        *count += 1;
        *count
    }

    pub fn get(&self, staff_message_id: i64) -> Option<&Ticket> {
        self.tickets.get(&staff_message_id)
    }

    pub(crate) fn get_mut(&mut self, staff_message_id: i64) -> Option<&mut Ticket> {
        self.tickets.get_mut(&staff_message_id)
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.len()
    }

    pub fn history_for(&self, user_id: i64) -> &[HistoryEntry] {
        self.history.get(&user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sync the history entry matching a closed ticket, scanning the most
    /// recent entries first.
    pub(crate) fn close_history_entry(
        &mut self,
        user_id: i64,
        staff_message_id: i64,
        status: TicketStatus,
    ) {
        if let Some(entries) = self.history.get_mut(&user_id) {
            if let Some(entry) = entries
                .iter_mut()
                .rev()
                .find(|e| e.staff_message_id == staff_message_id)
            {
                entry.status = status;
                entry.updated_at = Some(Utc::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(registry: &mut TicketRegistry, staff_message_id: i64, user_id: i64) -> u32 {
        registry.open_ticket(
            staff_message_id,
            user_id,
            user_id,
            "Ada @ada".to_string(),
            "Dune".to_string(),
            "Film".to_string(),
            "2021".to_string(),
        )
    }

    #[test]
    fn open_ticket_registers_everything_once() {
        let mut registry = TicketRegistry::new();
        let today_count = open(&mut registry, 500, 1);

        assert_eq!(today_count, 1);
        assert_eq!(registry.ticket_count(), 1);
        let ticket = registry.get(500).unwrap();
        assert_eq!(ticket.status, TicketStatus::New);
        assert_eq!(ticket.title, "Dune");
        assert!(ticket.assignee.is_none());

        let history = registry.history_for(1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].staff_message_id, 500);
        assert_eq!(history[0].status, TicketStatus::New);
    }

    #[test]
    fn daily_counter_increments_per_submission() {
        let mut registry = TicketRegistry::new();
        assert_eq!(open(&mut registry, 1, 1), 1);
        assert_eq!(open(&mut registry, 2, 2), 2);
        assert_eq!(open(&mut registry, 3, 1), 3);
    }

    #[test]
    fn history_is_bounded_to_twenty_entries() {
        let mut registry = TicketRegistry::new();
        for i in 0..25 {
            open(&mut registry, i, 1);
        }
        let history = registry.history_for(1);
        assert_eq!(history.len(), 20);
        // Oldest five evicted.
        assert_eq!(history[0].staff_message_id, 5);
        assert_eq!(history[19].staff_message_id, 24);
    }

    #[test]
    fn close_history_entry_updates_matching_ticket() {
        let mut registry = TicketRegistry::new();
        open(&mut registry, 10, 1);
        open(&mut registry, 11, 1);

        registry.close_history_entry(1, 10, TicketStatus::Done);

        let history = registry.history_for(1);
        assert_eq!(history[0].status, TicketStatus::Done);
        assert!(history[0].updated_at.is_some());
        assert_eq!(history[1].status, TicketStatus::New);
        assert!(history[1].updated_at.is_none());
    }

    #[test]
    fn terminal_statuses_are_flagged() {
        assert!(!TicketStatus::New.is_terminal());
        assert!(!TicketStatus::InProgress.is_terminal());
        assert!(TicketStatus::Done.is_terminal());
        assert!(TicketStatus::Unavailable.is_terminal());
        assert!(TicketStatus::AlreadyPresent.is_terminal());
    }
}
