//! Staff ticket-card formatting.
//!
//! The card posted to the staff channel is rewritten by a language model so
//! it reads well; the deterministic fallback keeps the flow alive when the
//! model is unreachable. The fallback wording is part of the bot's
//! contract: staff-side tooling may match on its header.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;

/// OpenAI API host.
const OPENAI_API_BASE: &str = "https://api.openai.com";

/// Model used for card rewriting; the card is short, small is plenty.
const MODEL: &str = "gpt-4o-mini";

/// Hard cap on the formatting call; the fallback takes over past this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// System instruction fixing the card's register and limits.
const SYSTEM_PROMPT: &str = "\
Sei un assistente helpdesk per richieste contenuti.
Il tuo compito è SOLO raccogliere e formattare richieste per lo staff.

Regole:
- Non fornire link, accessi o credenziali.
- Non fare promozioni o prezzi.
- Se l'utente chiede link/accesso, rispondi che puoi solo registrare la richiesta e inoltrarla allo staff.
- Tono: educato, neutro, chiaro.

Output: crea una scheda richiesta in italiano, ordinata e breve.";

/// Turns a raw request payload into a staff-readable card.
#[async_trait]
pub trait Formatter: Send + Sync {
    async fn format_ticket(&self, payload: &str) -> Result<String>;
}

/// Deterministic rendering used whenever the model call fails.
pub fn fallback_card(payload: &str) -> String {
    format!("📌 NUOVA RICHIESTA\n{payload}")
}

/// OpenAI-backed formatter.
pub struct OpenAiFormatter {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiFormatter {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(OPENAI_API_BASE.to_string(), api_key)
    }

    /// Point the formatter at a different host (tests).
    pub fn with_base_url(base_url: String, api_key: String) -> Self {
        Self {
            api_key,
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Formatter for OpenAiFormatter {
    async fn format_ticket(&self, payload: &str) -> Result<String> {
        let body = json!({
            "model": MODEL,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": payload },
            ],
        });

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .context("openai request failed")?;

        if !resp.status().is_success() {
            bail!("openai returned {}", resp.status());
        }

        let value: serde_json::Value =
            resp.json().await.context("openai response was not json")?;
        let content = value
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .context("openai response carried no content")?;

        let card = content.trim();
        if card.is_empty() {
            bail!("openai returned an empty card");
        }
        Ok(card.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn fallback_card_prefixes_the_payload() {
        let card = fallback_card("Titolo: Dune\n");
        assert!(card.starts_with("📌 NUOVA RICHIESTA\n"));
        assert!(card.contains("Titolo: Dune"));
    }

    #[tokio::test]
    async fn formats_via_chat_completions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({ "model": "gpt-4o-mini" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "  Scheda pronta  " } }]
            })))
            .mount(&server)
            .await;

        let formatter = OpenAiFormatter::with_base_url(server.uri(), "sk-test".to_string());
        let card = formatter.format_ticket("Titolo: Dune").await.unwrap();
        assert_eq!(card, "Scheda pronta");
    }

    #[tokio::test]
    async fn http_error_surfaces_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let formatter = OpenAiFormatter::with_base_url(server.uri(), "sk-test".to_string());
        assert!(formatter.format_ticket("Titolo: Dune").await.is_err());
    }

    #[tokio::test]
    async fn missing_content_surfaces_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let formatter = OpenAiFormatter::with_base_url(server.uri(), "sk-test".to_string());
        assert!(formatter.format_ticket("Titolo: Dune").await.is_err());
    }
}
