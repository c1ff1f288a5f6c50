//! Guided intake flow: a per-user state machine collecting the six request
//! fields through mixed button/text input.
//!
//! ## Design
//! - Each step is a sum-type variant and transition functions match on
//!   `(step, signal)` pairs, so an unhandled combination falls through to
//!   an explicit drop instead of a loosely-typed prefix check.
//! - Button signals that do not match the awaited step are dropped
//!   silently: they come from stale keyboards, not user mistakes.
//! - All free text is sanitized (trimmed, whitespace-collapsed, capped)
//!   before storage and screened for access/credential requests, which the
//!   bot refuses to relay.
//! - The final confirmation re-runs the time and rate gates; a form can
//!   sit open past closing time or past a freshly earned block.

use std::collections::HashMap;

use crate::dispatch::Action;
use crate::gates::TimeGate;
use crate::limits::RateLimiter;
use crate::telegram::keyboards;

/// Longest accepted free-text field after sanitization.
const MAX_TEXT_LEN: usize = 700;

/// Substrings marking a request for access or credentials rather than
/// content. Matched case-insensitively.
const SENSITIVE_MARKERS: [&str; 7] = [
    "link",
    "m3u",
    "playlist",
    "username",
    "password",
    "accesso",
    "attivazione",
];

const PROMPT_TITLE: &str = "Ok! Dimmi il *titolo* (film o serie).";
const PROMPT_KIND: &str = "Perfetto. È un film o una serie?";
const PROMPT_YEAR: &str = "Seleziona l'anno (oppure \u{201c}Non so\u{201d} / \u{201c}Scrivo io\u{201d}).";
const PROMPT_YEAR_MANUAL: &str = "Scrivi l'anno (es. 2019) oppure \u{201c}non so\u{201d}.";
const PROMPT_SERIES_MODE: &str = "La vuoi *completa* o vuoi specificare stagione/episodio?";
const PROMPT_SEASON_EPISODE: &str =
    "Scrivi stagione/episodio (es. S2 E5) oppure \u{201c}S2 completa\u{201d}.";
const PROMPT_LANGUAGE: &str = "Lingua richiesta?";
const PROMPT_LANGUAGE_MANUAL: &str =
    "Scrivi la lingua richiesta (es. ES, FR, ITA+SUB ENG, ecc.).";
const PROMPT_NOTES: &str = "Note extra? (se nulla scrivi \u{201c}-\u{201d})";
const PROMPT_NOTES_EDIT: &str = "Ok! Riscrivi le note (se nulla \u{201c}-\u{201d}).";
const PROMPT_CONFIRM: &str = "Confermi l'invio allo staff?";

/// Reply when a sensitive request arrives mid-flow.
const SENSITIVE_IN_FLOW: &str =
    "Non posso aiutare con link o accessi. Posso però registrare la richiesta. Prosegui rispondendo alle domande 🙂";

/// Reply to text arriving while a button step is awaited.
const REDIRECT_IDLE: &str =
    "Se vuoi iniziare una nuova richiesta: /request (oppure /cancel per annullare).";

/// Reply to a flow button pressed with no active form.
const NO_SESSION: &str = "Per iniziare una richiesta: /request";

// ── Form state ───────────────────────────────────────────────────

/// Intake step currently awaiting input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Title,
    Kind,
    Year,
    YearManual,
    SeriesMode,
    SeasonEpisode,
    Language,
    LanguageManual,
    Notes,
    Confirm,
}

/// The six collected request fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pub title: String,
    pub kind: String,
    pub year: String,
    pub season_episode: String,
    pub language: String,
    pub notes: String,
}

/// Per-user intake session.
#[derive(Debug, Clone)]
pub struct FormState {
    pub step: Step,
    pub data: FormData,
}

impl FormState {
    fn new() -> Self {
        Self {
            step: Step::Title,
            data: FormData::default(),
        }
    }
}

/// Owner of all active intake sessions, keyed by user id.
#[derive(Default)]
pub struct SessionStore {
    sessions: HashMap<i64, FormState>,
}

impl SessionStore {
    pub fn contains(&self, user_id: i64) -> bool {
        self.sessions.contains_key(&user_id)
    }

    pub fn step_of(&self, user_id: i64) -> Option<Step> {
        self.sessions.get(&user_id).map(|s| s.step)
    }

    pub fn get_mut(&mut self, user_id: i64) -> Option<&mut FormState> {
        self.sessions.get_mut(&user_id)
    }

    /// Drop a session; true when one existed.
    pub fn discard(&mut self, user_id: i64) -> bool {
        self.sessions.remove(&user_id).is_some()
    }

    /// Consume a session, returning its collected fields.
    pub fn take_data(&mut self, user_id: i64) -> Option<FormData> {
        self.sessions.remove(&user_id).map(|s| s.data)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

// ── Button signals ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Film,
    Series,
}

impl MediaKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "film" => Some(Self::Film),
            "serie" => Some(Self::Series),
            _ => None,
        }
    }

    /// Display label stored in the form.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Film => "Film",
            Self::Series => "Serie",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearChoice {
    Year(String),
    Unknown,
    Manual,
}

impl YearChoice {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "unknown" => Some(Self::Unknown),
            "manual" => Some(Self::Manual),
            year if year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()) => {
                Some(Self::Year(year.to_string()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesChoice {
    Complete,
    Specific,
}

impl SeriesChoice {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "complete" => Some(Self::Complete),
            "specific" => Some(Self::Specific),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageChoice {
    Fixed(String),
    Other,
}

impl LanguageChoice {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "" => None,
            "ALTRO" => Some(Self::Other),
            lang => Some(Self::Fixed(lang.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmChoice {
    Send,
    EditNotes,
}

impl ConfirmChoice {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "send" => Some(Self::Send),
            "editnotes" => Some(Self::EditNotes),
            _ => None,
        }
    }
}

/// A flow button press, already classified by category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowButton {
    Kind(MediaKind),
    Year(YearChoice),
    Series(SeriesChoice),
    Language(LanguageChoice),
    Confirm(ConfirmChoice),
}

/// What a button press produced.
#[derive(Debug)]
pub enum ButtonOutcome {
    /// Plain outbound actions.
    Actions(Vec<Action>),
    /// The form passed its final gates and must be handed to staff.
    Submit { form: FormData, actions: Vec<Action> },
}

// ── Sanitization ─────────────────────────────────────────────────

/// Trim, collapse internal whitespace, cap the length.
pub fn clean_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_TEXT_LEN).collect()
}

/// Whether the text asks for access/credentials instead of content.
pub fn is_sensitive_request(text: &str) -> bool {
    let lowered = text.to_lowercase();
    SENSITIVE_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Render the collected fields for the confirmation summary.
pub fn summary(data: &FormData) -> String {
    format!(
        "📌 Riepilogo richiesta\nTitolo: {}\nTipo: {}\nAnno: {}\nStagione/Episodio: {}\nLingua: {}\nNote: {}\n",
        data.title, data.kind, data.year, data.season_episode, data.language, data.notes
    )
}

// ── Transitions ──────────────────────────────────────────────────

/// Open a fresh session and return the first prompt. Callers have already
/// passed the admission gates.
pub fn start(sessions: &mut SessionStore, user_id: i64, chat_id: i64) -> Vec<Action> {
    sessions.sessions.insert(user_id, FormState::new());
    vec![Action::send_with_keyboard(
        chat_id,
        PROMPT_TITLE,
        keyboards::cancel(),
    )]
}

/// Feed one text message into the user's session.
///
/// Precondition: the session exists (the dispatcher checks, because the
/// no-session case needs the sensitive-text screening with different
/// wording).
pub fn handle_text(
    sessions: &mut SessionStore,
    user_id: i64,
    chat_id: i64,
    raw: &str,
) -> Vec<Action> {
    let Some(state) = sessions.get_mut(user_id) else {
        return Vec::new();
    };

    if is_sensitive_request(raw) {
        // Do not advance; the user can keep answering the open question.
        return vec![Action::send(chat_id, SENSITIVE_IN_FLOW)];
    }

    let text = clean_text(raw);
    if text.is_empty() {
        return vec![Action::send(chat_id, REDIRECT_IDLE)];
    }

    match state.step {
        Step::Title => {
            state.data.title = text;
            state.step = Step::Kind;
            vec![Action::send_with_keyboard(
                chat_id,
                PROMPT_KIND,
                keyboards::kind(),
            )]
        }
        Step::YearManual => {
            state.data.year = text;
            advance_past_year(state, chat_id)
        }
        Step::SeasonEpisode => {
            state.data.season_episode = text;
            state.step = Step::Language;
            vec![Action::send_with_keyboard(
                chat_id,
                PROMPT_LANGUAGE,
                keyboards::language(),
            )]
        }
        Step::LanguageManual => {
            state.data.language = text;
            state.step = Step::Notes;
            vec![Action::send_with_keyboard(
                chat_id,
                PROMPT_NOTES,
                keyboards::cancel(),
            )]
        }
        Step::Notes => {
            state.data.notes = text;
            state.step = Step::Confirm;
            vec![Action::send_with_keyboard(
                chat_id,
                format!("{}\n{PROMPT_CONFIRM}", summary(&state.data)),
                keyboards::confirm(),
            )]
        }
        // A button step is open; text cannot answer it.
        Step::Kind | Step::Year | Step::SeriesMode | Step::Language | Step::Confirm => {
            vec![Action::send(chat_id, REDIRECT_IDLE)]
        }
    }
}

/// Feed one flow button press into the user's session.
pub fn handle_button(
    sessions: &mut SessionStore,
    limits: &mut RateLimiter,
    time_gate: &TimeGate,
    user_id: i64,
    chat_id: i64,
    message_id: i64,
    button: FlowButton,
) -> ButtonOutcome {
    let Some(step) = sessions.step_of(user_id) else {
        return ButtonOutcome::Actions(vec![Action::send(chat_id, NO_SESSION)]);
    };

    // Final confirmation re-runs the admission gates and may consume the
    // session, so it is handled apart from the plain transitions.
    if step == Step::Confirm {
        let FlowButton::Confirm(choice) = button else {
            return ButtonOutcome::Actions(Vec::new());
        };
        return handle_confirm(sessions, limits, time_gate, user_id, chat_id, message_id, choice);
    }

    let Some(state) = sessions.get_mut(user_id) else {
        return ButtonOutcome::Actions(Vec::new());
    };

    let mut actions = vec![Action::clear_keyboard(chat_id, message_id)];
    match (step, button) {
        (Step::Kind, FlowButton::Kind(choice)) => {
            state.data.kind = choice.label().to_string();
            state.step = Step::Year;
            actions.push(Action::send_with_keyboard(
                chat_id,
                PROMPT_YEAR,
                keyboards::year(),
            ));
        }
        (Step::Year, FlowButton::Year(choice)) => match choice {
            YearChoice::Manual => {
                state.step = Step::YearManual;
                actions.push(Action::send_with_keyboard(
                    chat_id,
                    PROMPT_YEAR_MANUAL,
                    keyboards::cancel(),
                ));
            }
            YearChoice::Unknown => {
                state.data.year = "Non so".to_string();
                actions.extend(advance_past_year(state, chat_id));
            }
            YearChoice::Year(year) => {
                state.data.year = year;
                actions.extend(advance_past_year(state, chat_id));
            }
        },
        (Step::SeriesMode, FlowButton::Series(choice)) => match choice {
            SeriesChoice::Complete => {
                state.data.season_episode = "Completa".to_string();
                state.step = Step::Language;
                actions.push(Action::send_with_keyboard(
                    chat_id,
                    PROMPT_LANGUAGE,
                    keyboards::language(),
                ));
            }
            SeriesChoice::Specific => {
                state.step = Step::SeasonEpisode;
                actions.push(Action::send_with_keyboard(
                    chat_id,
                    PROMPT_SEASON_EPISODE,
                    keyboards::cancel(),
                ));
            }
        },
        (Step::Language, FlowButton::Language(choice)) => match choice {
            LanguageChoice::Other => {
                state.step = Step::LanguageManual;
                actions.push(Action::send_with_keyboard(
                    chat_id,
                    PROMPT_LANGUAGE_MANUAL,
                    keyboards::cancel(),
                ));
            }
            LanguageChoice::Fixed(lang) => {
                state.data.language = lang;
                state.step = Step::Notes;
                actions.push(Action::send_with_keyboard(
                    chat_id,
                    PROMPT_NOTES,
                    keyboards::cancel(),
                ));
            }
        },
        // Category does not match the awaited step: stale keyboard, drop.
        _ => return ButtonOutcome::Actions(Vec::new()),
    }
    ButtonOutcome::Actions(actions)
}

fn handle_confirm(
    sessions: &mut SessionStore,
    limits: &mut RateLimiter,
    time_gate: &TimeGate,
    user_id: i64,
    chat_id: i64,
    message_id: i64,
    choice: ConfirmChoice,
) -> ButtonOutcome {
    let mut actions = vec![Action::clear_keyboard(chat_id, message_id)];
    match choice {
        ConfirmChoice::EditNotes => {
            if let Some(state) = sessions.get_mut(user_id) {
                state.step = Step::Notes;
            }
            actions.push(Action::send_with_keyboard(
                chat_id,
                PROMPT_NOTES_EDIT,
                keyboards::cancel(),
            ));
            ButtonOutcome::Actions(actions)
        }
        ConfirmChoice::Send => {
            if !time_gate.is_open() {
                sessions.discard(user_id);
                actions.push(Action::send(chat_id, time_gate.closed_message()));
                return ButtonOutcome::Actions(actions);
            }
            if let Err(denial) = limits.try_admit(user_id) {
                sessions.discard(user_id);
                actions.push(Action::send(chat_id, denial.message()));
                return ButtonOutcome::Actions(actions);
            }
            let form = sessions.take_data(user_id).unwrap_or_default();
            ButtonOutcome::Submit { form, actions }
        }
    }
}

/// Shared branch after the year lands: series pick a mode, films skip the
/// season/episode question entirely.
fn advance_past_year(state: &mut FormState, chat_id: i64) -> Vec<Action> {
    if state.data.kind == MediaKind::Series.label() {
        state.step = Step::SeriesMode;
        vec![Action::send_with_keyboard(
            chat_id,
            PROMPT_SERIES_MODE,
            keyboards::series_mode(),
        )]
    } else {
        state.data.season_episode = "-".to_string();
        state.step = Step::Language;
        vec![Action::send_with_keyboard(
            chat_id,
            PROMPT_LANGUAGE,
            keyboards::language(),
        )]
    }
}
