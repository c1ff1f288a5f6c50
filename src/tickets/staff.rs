//! Staff control handling: applies a pressed button against a ticket's
//! current status and emits the resulting outbound actions.
//!
//! Transitions only ever move a ticket forward. Presses that arrive for an
//! unknown card, for a terminal ticket, or that would repeat a state are
//! dropped without output; they come from stale keyboards, not mistakes.

use tracing::{debug, info};

use super::{TicketRegistry, TicketStatus};
use crate::dispatch::Action;
use crate::telegram::keyboards;

/// A staff control pressed on a ticket card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffAction {
    Assign,
    InProgress,
    Done,
    Unavailable,
    AlreadyPresent,
}

impl StaffAction {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "assign" => Some(Self::Assign),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "na" => Some(Self::Unavailable),
            "already" => Some(Self::AlreadyPresent),
            _ => None,
        }
    }

    /// The terminal status this action closes a ticket with, if any.
    fn terminal_status(self) -> Option<TicketStatus> {
        match self {
            Self::Done => Some(TicketStatus::Done),
            Self::Unavailable => Some(TicketStatus::Unavailable),
            Self::AlreadyPresent => Some(TicketStatus::AlreadyPresent),
            Self::Assign | Self::InProgress => None,
        }
    }
}

/// Requester-facing wording for each terminal status.
fn closed_notice(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Done => "🟢 La tua richiesta è stata completata. Grazie!",
        TicketStatus::Unavailable => "🔴 La tua richiesta al momento non è disponibile.",
        TicketStatus::AlreadyPresent => {
            "🟠 Questa richiesta risulta già presente. Controlla bene e, se serve, specifica meglio titolo/anno."
        }
        TicketStatus::New | TicketStatus::InProgress => "",
    }
}

/// Apply one staff action to the ticket keyed by `message_id`.
///
/// The registry mutation is the source of truth; the returned actions are
/// best-effort view updates and notifications executed afterwards.
pub fn handle_staff_action(
    registry: &mut TicketRegistry,
    staff_chat_id: i64,
    message_id: i64,
    action: StaffAction,
    staff_name: &str,
    card_text: &str,
) -> Vec<Action> {
    let Some(ticket) = registry.get_mut(message_id) else {
        debug!("staff action {action:?} for unknown ticket message {message_id}");
        return Vec::new();
    };
    if ticket.status.is_terminal() {
        // Only one terminal transition is meaningful; later clicks are stale.
        return Vec::new();
    }

    match action {
        StaffAction::Assign => {
            ticket.assignee = Some(staff_name.to_string());
            vec![Action::EditText {
                chat_id: staff_chat_id,
                message_id,
                text: format!("{card_text}\n\n👤 Assegnata a: {staff_name}"),
                keyboard: Some(keyboards::staff_followup()),
            }]
        }
        StaffAction::InProgress => {
            if ticket.status == TicketStatus::InProgress {
                return Vec::new();
            }
            ticket.status = TicketStatus::InProgress;
            if ticket.assignee.is_none() {
                ticket.assignee = Some(staff_name.to_string());
            }
            let assignee = ticket.assignee.clone().unwrap_or_default();
            vec![
                Action::send(
                    ticket.user_chat_id,
                    "🟡 La tua richiesta è stata presa in carico dallo staff.",
                ),
                Action::EditText {
                    chat_id: staff_chat_id,
                    message_id,
                    text: format!(
                        "{card_text}\n\n📌 Stato: {} (da {assignee})",
                        TicketStatus::InProgress.label()
                    ),
                    keyboard: Some(keyboards::staff_followup()),
                },
            ]
        }
        StaffAction::Done | StaffAction::Unavailable | StaffAction::AlreadyPresent => {
            let Some(status) = action.terminal_status() else {
                return Vec::new();
            };
            ticket.status = status;
            ticket.closed_by = Some(staff_name.to_string());
            let assignee = ticket
                .assignee
                .clone()
                .unwrap_or_else(|| staff_name.to_string());
            let user_id = ticket.user_id;
            let user_chat_id = ticket.user_chat_id;
            info!(
                "ticket {message_id} ({} / {}) closed as {} by {staff_name}",
                ticket.title,
                ticket.year,
                status.label()
            );

            let actions = vec![
                Action::send(user_chat_id, closed_notice(status)),
                Action::EditText {
                    chat_id: staff_chat_id,
                    message_id,
                    text: format!(
                        "{card_text}\n\n📌 Stato: {} (da {staff_name})\n👤 Assegnata a: {assignee}",
                        status.label()
                    ),
                    // Closing removes every staff control from the card.
                    keyboard: None,
                },
            ];
            registry.close_history_entry(user_id, message_id, status);
            actions
        }
    }
}
