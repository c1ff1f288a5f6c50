//! Inline keyboard layouts for the intake flow and the staff ticket card.
//!
//! Callback payloads follow the `category:value` convention parsed by the
//! dispatch layer. Layouts mirror the conversational order of the intake
//! steps; the staff card starts with the full control set and shrinks as
//! the ticket progresses.

use super::{btn, InlineKeyboard};

/// Lone cancel row shown under every free-text prompt.
pub fn cancel() -> InlineKeyboard {
    InlineKeyboard::new().row(vec![btn("❌ Annulla", "cancel")])
}

/// Film / series choice.
pub fn kind() -> InlineKeyboard {
    InlineKeyboard::new()
        .row(vec![btn("🎬 Film", "type:film"), btn("📺 Serie", "type:serie")])
        .row(vec![btn("❌ Annulla", "cancel")])
}

/// Recent years, plus "don't know" and manual entry.
pub fn year() -> InlineKeyboard {
    InlineKeyboard::new()
        .row(vec![
            btn("2026", "year:2026"),
            btn("2025", "year:2025"),
            btn("2024", "year:2024"),
        ])
        .row(vec![
            btn("2023", "year:2023"),
            btn("2022", "year:2022"),
            btn("2021", "year:2021"),
        ])
        .row(vec![btn("Non so", "year:unknown"), btn("Scrivo io", "year:manual")])
        .row(vec![btn("❌ Annulla", "cancel")])
}

/// Whole series or a specific season/episode.
pub fn series_mode() -> InlineKeyboard {
    InlineKeyboard::new()
        .row(vec![
            btn("✅ Completa", "series:complete"),
            btn("🎯 Specifico S/E", "series:specific"),
        ])
        .row(vec![btn("❌ Annulla", "cancel")])
}

/// Language choice, with a manual escape hatch.
pub fn language() -> InlineKeyboard {
    InlineKeyboard::new()
        .row(vec![btn("🇮🇹 ITA", "lang:ITA"), btn("🇬🇧 ENG", "lang:ENG")])
        .row(vec![
            btn("🇮🇹+🇬🇧 ITA+ENG", "lang:ITA+ENG"),
            btn("Altro", "lang:ALTRO"),
        ])
        .row(vec![btn("❌ Annulla", "cancel")])
}

/// Final confirmation: send, or go back and rewrite the notes.
pub fn confirm() -> InlineKeyboard {
    InlineKeyboard::new()
        .row(vec![
            btn("✅ Conferma invio", "confirm:send"),
            btn("✏️ Modifica note", "confirm:editnotes"),
        ])
        .row(vec![btn("❌ Annulla", "cancel")])
}

/// Full staff control set attached to a fresh ticket card.
pub fn staff_initial() -> InlineKeyboard {
    InlineKeyboard::new()
        .row(vec![btn("👤 Assegnata a me", "staff:assign")])
        .row(vec![
            btn("🟡 Presa in carico", "staff:in_progress"),
            btn("🟢 Completata", "staff:done"),
        ])
        .row(vec![
            btn("🔴 Non Disponibile", "staff:na"),
            btn("🟠 Già presente (controlla bene)", "staff:already"),
        ])
}

/// Reduced control set after assignment or take-over: closing actions only.
pub fn staff_followup() -> InlineKeyboard {
    InlineKeyboard::new()
        .row(vec![
            btn("🟢 Completata", "staff:done"),
            btn("🔴 Non Disponibile", "staff:na"),
        ])
        .row(vec![btn("🟠 Già presente (controlla bene)", "staff:already")])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(kb: &InlineKeyboard) -> Vec<String> {
        kb.inline_keyboard
            .iter()
            .flatten()
            .map(|b| b.callback_data.clone())
            .collect()
    }

    #[test]
    fn every_flow_keyboard_carries_cancel() {
        for kb in [cancel(), kind(), year(), series_mode(), language(), confirm()] {
            assert!(payloads(&kb).contains(&"cancel".to_string()));
        }
    }

    #[test]
    fn year_keyboard_covers_recent_years_and_escapes() {
        let data = payloads(&year());
        for y in 2021..=2026 {
            assert!(data.contains(&format!("year:{y}")));
        }
        assert!(data.contains(&"year:unknown".to_string()));
        assert!(data.contains(&"year:manual".to_string()));
    }

    #[test]
    fn staff_followup_drops_non_closing_controls() {
        let data = payloads(&staff_followup());
        assert!(!data.contains(&"staff:assign".to_string()));
        assert!(!data.contains(&"staff:in_progress".to_string()));
        assert_eq!(data.len(), 3);
    }
}
