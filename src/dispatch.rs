//! Inbound signal classification and outbound action execution.
//!
//! Each transport update is classified into {user command, user text, user
//! flow button, staff button} and routed to the owning component while the
//! single state lock is held. Components return [`Action`] values instead
//! of doing I/O inline; this module executes them afterwards, absorbing
//! collaborator failures so a transport hiccup can never corrupt registry
//! state.
//!
//! ## Design
//! - One `parking_lot::Mutex` guards all mutable state; it is never held
//!   across an await point.
//! - Updates are processed strictly one at a time by the poll loop, so
//!   per-user step ordering and per-ticket receipt ordering hold for free.
//! - A failed text edit degrades to a keyboard swap; a failed send is
//!   logged and dropped.

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::formatter::{fallback_card, Formatter};
use crate::gates::{MembershipGuard, TimeGate};
use crate::intake::{
    self, ButtonOutcome, ConfirmChoice, FlowButton, FormData, LanguageChoice, MediaKind,
    SeriesChoice, SessionStore, YearChoice,
};
use crate::limits::RateLimiter;
use crate::telegram::{keyboards, CallbackQuery, InlineKeyboard, Message, Transport, Update, User};
use crate::tickets::{handle_staff_action, StaffAction, TicketRegistry};

/// Greeting for /start and /help.
const INTRO: &str = "Ciao! 👋 Posso registrare una richiesta e inoltrarla allo staff.\n\
Scrivi /request per iniziare.\n\
Nota: non posso fornire link o accessi, solo raccogliere la richiesta.";

const MEMBERS_ONLY: &str =
    "⛔ Questo bot è riservato agli utenti del gruppo. Se pensi sia un errore, contatta un admin.";
const MEMBERS_ONLY_MIDFLOW: &str = "⛔ Questo bot è riservato agli utenti del gruppo.";
const CANCELLED: &str = "Richiesta annullata. Se vuoi riprovare: /request";
const SENSITIVE_IDLE: &str =
    "Posso solo registrare la richiesta e inoltrarla allo staff. Usa /request per iniziare.";
const STAFF_DELIVERY_FAILED: &str =
    "⚠️ Non sono riuscito a inoltrare la richiesta allo staff. Riprova più tardi.";

// ── Outbound actions ─────────────────────────────────────────────

/// One outbound transport effect produced by a component.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send a new message.
    Send {
        chat_id: i64,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    /// Replace a message's text and keyboard. Degrades to a keyboard swap
    /// when the text edit is rejected.
    EditText {
        chat_id: i64,
        message_id: i64,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    /// Remove the inline keyboard from a previously sent message.
    ClearKeyboard { chat_id: i64, message_id: i64 },
}

impl Action {
    pub fn send(chat_id: i64, text: impl Into<String>) -> Self {
        Self::Send {
            chat_id,
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn send_with_keyboard(
        chat_id: i64,
        text: impl Into<String>,
        keyboard: InlineKeyboard,
    ) -> Self {
        Self::Send {
            chat_id,
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }

    pub fn clear_keyboard(chat_id: i64, message_id: i64) -> Self {
        Self::ClearKeyboard {
            chat_id,
            message_id,
        }
    }
}

// ── Signal classification ────────────────────────────────────────

/// Parsed callback payload, classified by owner.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackData {
    Cancel,
    Flow(FlowButton),
    Staff(StaffAction),
}

impl CallbackData {
    /// Parse raw callback data. `None` means a payload this bot never
    /// produced (stale or foreign), which callers drop silently.
    pub fn parse(data: &str) -> Option<Self> {
        if data == "cancel" {
            return Some(Self::Cancel);
        }
        let (category, value) = data.split_once(':')?;
        match category {
            "staff" => StaffAction::parse(value).map(Self::Staff),
            "type" => MediaKind::parse(value).map(|k| Self::Flow(FlowButton::Kind(k))),
            "year" => YearChoice::parse(value).map(|c| Self::Flow(FlowButton::Year(c))),
            "series" => SeriesChoice::parse(value).map(|c| Self::Flow(FlowButton::Series(c))),
            "lang" => LanguageChoice::parse(value).map(|c| Self::Flow(FlowButton::Language(c))),
            "confirm" => ConfirmChoice::parse(value).map(|c| Self::Flow(FlowButton::Confirm(c))),
            _ => None,
        }
    }
}

// ── Core state ───────────────────────────────────────────────────

/// All mutable bot state, behind one coarse lock.
pub struct CoreState {
    pub sessions: SessionStore,
    pub limits: RateLimiter,
    pub registry: TicketRegistry,
}

impl CoreState {
    pub fn new(config: &Config) -> Self {
        Self {
            sessions: SessionStore::default(),
            limits: RateLimiter::new(
                config.max_requests_24h,
                config.spam_window_secs,
                config.spam_streak_limit,
                config.block_secs,
            ),
            registry: TicketRegistry::new(),
        }
    }

    /// Record one confirmed submission end to end: ticket, history entry,
    /// limiter bookkeeping, daily counter. Returns today's count.
    pub fn finalize_submission(
        &mut self,
        staff_message_id: i64,
        user_id: i64,
        user_chat_id: i64,
        user_display: String,
        form: &FormData,
    ) -> u32 {
        let today = self.registry.open_ticket(
            staff_message_id,
            user_id,
            user_chat_id,
            user_display,
            form.title.clone(),
            form.kind.clone(),
            form.year.clone(),
        );
        self.limits.record_submission(user_id);
        today
    }
}

// ── Dispatcher ───────────────────────────────────────────────────

/// Routes classified signals to the owning component and executes the
/// outbound actions they return.
pub struct Dispatcher<T: Transport, F: Formatter> {
    transport: T,
    formatter: F,
    time_gate: TimeGate,
    membership: MembershipGuard,
    staff_chat_id: i64,
    state: Mutex<CoreState>,
}

impl<T: Transport, F: Formatter> Dispatcher<T, F> {
    pub fn new(config: &Config, transport: T, formatter: F) -> Self {
        Self {
            transport,
            formatter,
            time_gate: TimeGate::new(
                config.timezone,
                config.request_start_hour,
                config.request_end_hour,
            ),
            membership: MembershipGuard::new(config.member_group_id),
            staff_chat_id: config.staff_chat_id,
            state: Mutex::new(CoreState::new(config)),
        }
    }

    /// Process one inbound update to completion.
    pub async fn handle_update(&self, update: Update) {
        if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await;
        } else if let Some(message) = update.message {
            self.handle_message(message).await;
        }
    }

    async fn handle_message(&self, message: Message) {
        let (Some(from), Some(text)) = (message.from, message.text) else {
            return;
        };
        let chat_id = message.chat.id;

        // `/request@botname` arrives when the command is tapped in a group.
        let command = text
            .trim()
            .split_whitespace()
            .next()
            .map(|token| token.split('@').next().unwrap_or(token));

        match command {
            Some("/start") | Some("/help") => self.run(vec![Action::send(chat_id, INTRO)]).await,
            Some("/cancel") => {
                self.state.lock().sessions.discard(from.id);
                self.run(vec![Action::send(chat_id, CANCELLED)]).await;
            }
            Some("/request") => self.begin_request(&from, chat_id).await,
            _ => self.flow_text(&from, chat_id, &text).await,
        }
    }

    async fn begin_request(&self, user: &User, chat_id: i64) {
        if !self.time_gate.is_open() {
            self.run(vec![Action::send(chat_id, self.time_gate.closed_message())])
                .await;
            return;
        }
        if !self.membership.is_member(&self.transport, user.id).await {
            self.run(vec![Action::send(chat_id, MEMBERS_ONLY)]).await;
            return;
        }

        let actions = {
            let mut state = self.state.lock();
            match state.limits.try_admit(user.id) {
                Err(denial) => vec![Action::send(chat_id, denial.message())],
                Ok(()) => intake::start(&mut state.sessions, user.id, chat_id),
            }
        };
        self.run(actions).await;
    }

    async fn flow_text(&self, user: &User, chat_id: i64, text: &str) {
        let has_session = self.state.lock().sessions.contains(user.id);
        if !has_session {
            if intake::is_sensitive_request(text) {
                self.run(vec![Action::send(chat_id, SENSITIVE_IDLE)]).await;
            }
            return;
        }

        // Membership can lapse while a form sits open; re-check per input.
        if !self.membership.is_member(&self.transport, user.id).await {
            self.state.lock().sessions.discard(user.id);
            self.run(vec![Action::send(chat_id, MEMBERS_ONLY_MIDFLOW)]).await;
            return;
        }

        let actions = {
            let mut state = self.state.lock();
            intake::handle_text(&mut state.sessions, user.id, chat_id, text)
        };
        self.run(actions).await;
    }

    async fn handle_callback(&self, callback: CallbackQuery) {
        if let Err(err) = self.transport.answer_callback(&callback.id).await {
            warn!("callback ack failed: {err:#}");
        }

        let Some(message) = callback.message else {
            return;
        };
        let chat_id = message.chat.id;
        let message_id = message.message_id;
        let data = callback.data.unwrap_or_default();
        let Some(parsed) = CallbackData::parse(&data) else {
            debug!("unrecognized callback payload {data:?}");
            return;
        };

        match parsed {
            CallbackData::Cancel => {
                self.state.lock().sessions.discard(callback.from.id);
                self.run(vec![
                    Action::clear_keyboard(chat_id, message_id),
                    Action::send(chat_id, CANCELLED),
                ])
                .await;
            }
            CallbackData::Staff(action) => {
                // Staff controls are only honored inside the staff channel.
                if chat_id != self.staff_chat_id {
                    return;
                }
                let staff_name = callback.from.display_name();
                let card_text = message.text.unwrap_or_default();
                let actions = {
                    let mut state = self.state.lock();
                    handle_staff_action(
                        &mut state.registry,
                        self.staff_chat_id,
                        message_id,
                        action,
                        &staff_name,
                        &card_text,
                    )
                };
                self.run(actions).await;
            }
            CallbackData::Flow(button) => {
                self.flow_button(&callback.from, chat_id, message_id, button)
                    .await;
            }
        }
    }

    async fn flow_button(&self, user: &User, chat_id: i64, message_id: i64, button: FlowButton) {
        let outcome = {
            let mut guard = self.state.lock();
            let CoreState {
                sessions, limits, ..
            } = &mut *guard;
            intake::handle_button(
                sessions,
                limits,
                &self.time_gate,
                user.id,
                chat_id,
                message_id,
                button,
            )
        };
        match outcome {
            ButtonOutcome::Actions(actions) => self.run(actions).await,
            ButtonOutcome::Submit { form, actions } => {
                self.run(actions).await;
                self.submit(user, chat_id, form).await;
            }
        }
    }

    /// Hand a confirmed form to the staff channel and register the ticket.
    async fn submit(&self, user: &User, chat_id: i64, form: FormData) {
        let payload = ticket_payload(user, &form);
        let card = match self.formatter.format_ticket(&payload).await {
            Ok(text) => text,
            Err(err) => {
                warn!("formatter failed, using fallback card: {err:#}");
                fallback_card(&payload)
            }
        };

        let staff_message_id = match self
            .transport
            .send_message(self.staff_chat_id, &card, Some(&keyboards::staff_initial()))
            .await
        {
            Ok(id) => id,
            Err(err) => {
                // The card is the ticket's identity; without it there is
                // nothing to register.
                error!("staff hand-off failed: {err:#}");
                self.run(vec![Action::send(chat_id, STAFF_DELIVERY_FAILED)])
                    .await;
                return;
            }
        };

        let today = self.state.lock().finalize_submission(
            staff_message_id,
            user.id,
            chat_id,
            user.display_name(),
            &form,
        );
        info!(
            "ticket opened: staff message {staff_message_id} for user {}",
            user.id
        );
        self.run(vec![Action::send(
            chat_id,
            format!("✅ Inviato allo staff. (Richieste oggi: {today}) Grazie!"),
        )])
        .await;
    }

    /// Execute outbound actions in order, absorbing failures per action.
    async fn run(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send {
                    chat_id,
                    text,
                    keyboard,
                } => {
                    if let Err(err) = self
                        .transport
                        .send_message(chat_id, &text, keyboard.as_ref())
                        .await
                    {
                        warn!("send to chat {chat_id} failed: {err:#}");
                    }
                }
                Action::EditText {
                    chat_id,
                    message_id,
                    text,
                    keyboard,
                } => {
                    if let Err(err) = self
                        .transport
                        .edit_message_text(chat_id, message_id, &text, keyboard.as_ref())
                        .await
                    {
                        warn!("edit of message {message_id} failed, swapping keyboard only: {err:#}");
                        if let Err(err) = self
                            .transport
                            .edit_reply_markup(chat_id, message_id, keyboard.as_ref())
                            .await
                        {
                            warn!("keyboard swap for message {message_id} failed: {err:#}");
                        }
                    }
                }
                Action::ClearKeyboard {
                    chat_id,
                    message_id,
                } => {
                    if let Err(err) = self
                        .transport
                        .edit_reply_markup(chat_id, message_id, None)
                        .await
                    {
                        debug!("keyboard clear for message {message_id} failed: {err:#}");
                    }
                }
            }
        }
    }
}

/// Raw structured payload handed to the formatter.
fn ticket_payload(user: &User, form: &FormData) -> String {
    format!(
        "Utente: {} | {} | id:{}\nTitolo: {}\nTipo: {}\nAnno: {}\nStagione/Episodio: {}\nLingua: {}\nNote: {}\n",
        user.full_name(),
        user.username_tag(),
        user.id,
        form.title,
        form.kind,
        form.year,
        form.season_episode,
        form.language,
        form.notes
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::telegram::testing::RecordingTransport;
    use crate::telegram::{Chat, ChatMemberStatus};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;

    const USER_CHAT: i64 = 1;
    const STAFF_CHAT: i64 = -1001111111111;

    /// Formatter that always fails, forcing the deterministic fallback.
    struct FailingFormatter;

    #[async_trait]
    impl Formatter for FailingFormatter {
        async fn format_ticket(&self, _payload: &str) -> Result<String> {
            anyhow::bail!("formatter offline")
        }
    }

    fn config(start_hour: u32, end_hour: u32) -> Config {
        let env = HashMap::from([
            ("TELEGRAM_BOT_TOKEN", "123:abc".to_string()),
            ("OPENAI_API_KEY", "sk-test".to_string()),
            ("STAFF_CHAT_ID", STAFF_CHAT.to_string()),
            ("MEMBER_GROUP_ID", "-1002222222222".to_string()),
            ("REQUEST_START_HOUR", start_hour.to_string()),
            ("REQUEST_END_HOUR", end_hour.to_string()),
        ]);
        Config::from_lookup(|key| env.get(key).cloned()).unwrap()
    }

    fn dispatcher(
        config: &Config,
    ) -> Dispatcher<RecordingTransport, FailingFormatter> {
        Dispatcher::new(config, RecordingTransport::new(), FailingFormatter)
    }

    fn user() -> User {
        User {
            id: 7,
            first_name: "Ada".to_string(),
            last_name: None,
            username: Some("ada".to_string()),
        }
    }

    fn text_update(text: &str) -> Update {
        Update {
            update_id: 1,
            message: Some(Message {
                message_id: 10,
                from: Some(user()),
                chat: Chat { id: USER_CHAT },
                text: Some(text.to_string()),
            }),
            callback_query: None,
        }
    }

    fn button_update(chat_id: i64, message_id: i64, data: &str) -> Update {
        button_update_with_text(chat_id, message_id, data, "card")
    }

    fn button_update_with_text(chat_id: i64, message_id: i64, data: &str, text: &str) -> Update {
        Update {
            update_id: 1,
            message: None,
            callback_query: Some(CallbackQuery {
                id: "cb".to_string(),
                from: user(),
                message: Some(Message {
                    message_id,
                    from: None,
                    chat: Chat { id: chat_id },
                    text: Some(text.to_string()),
                }),
                data: Some(data.to_string()),
            }),
        }
    }

    #[test]
    fn callback_data_classification() {
        assert_eq!(CallbackData::parse("cancel"), Some(CallbackData::Cancel));
        assert!(matches!(
            CallbackData::parse("staff:done"),
            Some(CallbackData::Staff(StaffAction::Done))
        ));
        assert!(matches!(
            CallbackData::parse("type:film"),
            Some(CallbackData::Flow(FlowButton::Kind(MediaKind::Film)))
        ));
        assert_eq!(CallbackData::parse("bogus:thing"), None);
        assert_eq!(CallbackData::parse("year:12345"), None);
        assert_eq!(CallbackData::parse(""), None);
    }

    #[tokio::test]
    async fn closed_hours_reject_request_without_state() {
        let config = config(0, 1);
        // The test must not depend on wall-clock time; swap in a gate that
        // is closed at every hour.
        let dispatcher = Dispatcher {
            time_gate: TimeGate::new(config.timezone, 0, 0),
            ..Dispatcher::new(&config, RecordingTransport::new(), FailingFormatter)
        };

        dispatcher.handle_update(text_update("/request")).await;

        assert_eq!(dispatcher.state.lock().sessions.active_sessions(), 0);
        let texts = dispatcher.transport.sent_texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Le richieste sono attive"));
    }

    #[tokio::test]
    async fn non_member_is_turned_away() {
        let config = config(0, 24);
        let dispatcher = dispatcher(&config);
        *dispatcher.transport.member_status.lock() = Some(ChatMemberStatus::Left);

        dispatcher.handle_update(text_update("/request")).await;

        assert_eq!(dispatcher.state.lock().sessions.active_sessions(), 0);
        assert!(dispatcher.transport.sent_texts()[0].contains("riservato agli utenti"));
    }

    #[tokio::test]
    async fn full_film_submission_round_trip() {
        let config = config(0, 24);
        let dispatcher = dispatcher(&config);

        dispatcher.handle_update(text_update("/request")).await;
        dispatcher.handle_update(text_update("Dune")).await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 20, "type:film"))
            .await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 21, "year:2021"))
            .await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 22, "lang:ITA"))
            .await;
        dispatcher.handle_update(text_update("-")).await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 23, "confirm:send"))
            .await;

        {
            let state = dispatcher.state.lock();
            assert_eq!(state.registry.ticket_count(), 1);
            assert_eq!(state.sessions.active_sessions(), 0);
            let history = state.registry.history_for(7);
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].title, "Dune");
            assert_eq!(history[0].kind, "Film");
            assert_eq!(history[0].year, "2021");
            let ticket = state.registry.get(history[0].staff_message_id).unwrap();
            assert_eq!(ticket.status, crate::tickets::TicketStatus::New);
            assert_eq!(ticket.user_id, 7);
        }

        let sent = dispatcher.transport.sent.lock();
        // The staff card went to the staff chat with the initial controls,
        // rendered by the fallback because the formatter is down.
        let card = sent
            .iter()
            .find(|m| m.chat_id == STAFF_CHAT)
            .expect("staff card sent");
        assert!(card.text.starts_with("📌 NUOVA RICHIESTA"));
        assert!(card.text.contains("Titolo: Dune"));
        assert!(card.text.contains("Stagione/Episodio: -"));
        assert!(card.keyboard.is_some());

        let ack = sent.last().unwrap();
        assert_eq!(ack.chat_id, USER_CHAT);
        assert!(ack.text.contains("Richieste oggi: 1"));
    }

    #[tokio::test]
    async fn staff_done_flow_notifies_requester_and_closes() {
        let config = config(0, 24);
        let dispatcher = dispatcher(&config);

        dispatcher.handle_update(text_update("/request")).await;
        dispatcher.handle_update(text_update("Dune")).await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 20, "type:film"))
            .await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 21, "year:2021"))
            .await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 22, "lang:ITA"))
            .await;
        dispatcher.handle_update(text_update("-")).await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 23, "confirm:send"))
            .await;

        let card_id = {
            let state = dispatcher.state.lock();
            state.registry.history_for(7)[0].staff_message_id
        };

        dispatcher
            .handle_update(button_update(STAFF_CHAT, card_id, "staff:done"))
            .await;

        {
            let state = dispatcher.state.lock();
            let ticket = state.registry.get(card_id).unwrap();
            assert!(ticket.status.is_terminal());
        }
        let texts = dispatcher.transport.sent_texts();
        assert!(texts.iter().any(|t| t.contains("è stata completata")));

        // A stale follow-up click mutates nothing and sends nothing.
        let sends_before = dispatcher.transport.sent.lock().len();
        dispatcher
            .handle_update(button_update(STAFF_CHAT, card_id, "staff:na"))
            .await;
        assert_eq!(dispatcher.transport.sent.lock().len(), sends_before);
    }

    #[tokio::test]
    async fn staff_buttons_outside_staff_chat_are_ignored() {
        let config = config(0, 24);
        let dispatcher = dispatcher(&config);
        dispatcher
            .handle_update(button_update(USER_CHAT, 50, "staff:done"))
            .await;
        assert!(dispatcher.transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn membership_lapse_mid_flow_discards_the_form() {
        let config = config(0, 24);
        let dispatcher = dispatcher(&config);

        dispatcher.handle_update(text_update("/request")).await;
        assert_eq!(dispatcher.state.lock().sessions.active_sessions(), 1);

        *dispatcher.transport.member_status.lock() = Some(ChatMemberStatus::Kicked);
        dispatcher.handle_update(text_update("Dune")).await;

        assert_eq!(dispatcher.state.lock().sessions.active_sessions(), 0);
        assert!(dispatcher
            .transport
            .sent_texts()
            .last()
            .unwrap()
            .contains("riservato agli utenti"));
    }

    #[tokio::test]
    async fn sensitive_text_without_a_form_invites_request() {
        let config = config(0, 24);
        let dispatcher = dispatcher(&config);
        dispatcher
            .handle_update(text_update("mi mandi la playlist?"))
            .await;
        let texts = dispatcher.transport.sent_texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Usa /request"));
    }

    #[tokio::test]
    async fn cancel_command_discards_the_form() {
        let config = config(0, 24);
        let dispatcher = dispatcher(&config);
        dispatcher.handle_update(text_update("/request")).await;
        dispatcher.handle_update(text_update("/cancel")).await;
        assert_eq!(dispatcher.state.lock().sessions.active_sessions(), 0);
        assert!(dispatcher
            .transport
            .sent_texts()
            .last()
            .unwrap()
            .contains("Richiesta annullata"));
    }

    #[tokio::test]
    async fn staff_delivery_failure_keeps_registry_clean() {
        let config = config(0, 24);
        let dispatcher = dispatcher(&config);

        dispatcher.handle_update(text_update("/request")).await;
        dispatcher.handle_update(text_update("Dune")).await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 20, "type:film"))
            .await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 21, "year:2021"))
            .await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 22, "lang:ITA"))
            .await;
        dispatcher.handle_update(text_update("-")).await;

        dispatcher
            .transport
            .fail_sends
            .store(true, std::sync::atomic::Ordering::SeqCst);
        dispatcher
            .handle_update(button_update(USER_CHAT, 23, "confirm:send"))
            .await;

        let state = dispatcher.state.lock();
        assert_eq!(state.registry.ticket_count(), 0);
        assert_eq!(state.sessions.active_sessions(), 0);
        assert_eq!(state.registry.history_for(7).len(), 0);
    }

    #[tokio::test]
    async fn failed_card_edit_degrades_to_keyboard_swap() {
        let config = config(0, 24);
        let dispatcher = dispatcher(&config);

        dispatcher.handle_update(text_update("/request")).await;
        dispatcher.handle_update(text_update("Dune")).await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 20, "type:film"))
            .await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 21, "year:2021"))
            .await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 22, "lang:ITA"))
            .await;
        dispatcher.handle_update(text_update("-")).await;
        dispatcher
            .handle_update(button_update(USER_CHAT, 23, "confirm:send"))
            .await;

        let card_id = {
            let state = dispatcher.state.lock();
            state.registry.history_for(7)[0].staff_message_id
        };

        dispatcher
            .transport
            .fail_text_edits
            .store(true, std::sync::atomic::Ordering::SeqCst);
        dispatcher
            .handle_update(button_update(STAFF_CHAT, card_id, "staff:done"))
            .await;

        // Status is the source of truth even though the edit failed; the
        // fallback at least swapped the keyboard away.
        let state = dispatcher.state.lock();
        assert!(state.registry.get(card_id).unwrap().status.is_terminal());
        let markup_edits = dispatcher.transport.markup_edits.lock();
        assert!(markup_edits
            .iter()
            .any(|(chat, msg, kb)| *chat == STAFF_CHAT && *msg == card_id && kb.is_none()));
    }
}
