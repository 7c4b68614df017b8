//! Query intent classification.
//!
//! A query is bucketed into WEB / PDF / CHAT with one temperature-0 completion.
//! Classification never fails the overall query: greetings short-circuit, any
//! unexpected answer maps to CHAT, and request failures fail open to CHAT.

use tracing::warn;

use crate::config::CLASSIFIER_MODEL;
use crate::llm::{ChatMessage, MistralClient};

/// Coarse classification of a query's required context source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Current events, news, facts not in a private document
    Web,
    /// Questions about uploaded files or documents
    Pdf,
    /// Greetings, coding, math, general conversation
    Chat,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Web => "WEB",
            Intent::Pdf => "PDF",
            Intent::Chat => "CHAT",
        }
    }

    /// Map a raw model answer to an intent. Anything outside WEB/PDF is CHAT.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_uppercase().as_str() {
            "WEB" => Intent::Web,
            "PDF" => Intent::Pdf,
            _ => Intent::Chat,
        }
    }
}

/// Queries treated as greetings by the classifier (no LLM call).
pub const CLASSIFIER_GREETINGS: &[&str] = &["hi", "hello", "hey", "sup", "how are you"];

/// Queries for which the orchestrator skips retrieval entirely.
pub const BARE_GREETINGS: &[&str] = &["hi", "hello", "hey"];

fn matches_any(query: &str, list: &[&str]) -> bool {
    let normalized = query.trim().to_lowercase();
    list.contains(&normalized.as_str())
}

/// Case-insensitive, whitespace-trimmed match against the classifier list.
pub fn is_greeting(query: &str) -> bool {
    matches_any(query, CLASSIFIER_GREETINGS)
}

/// Match against the shorter list used to skip retrieval.
pub fn is_bare_greeting(query: &str) -> bool {
    matches_any(query, BARE_GREETINGS)
}

fn classification_prompt(query: &str) -> String {
    format!(
        "Classify the intent of this user query:\n\
         1. WEB: Current events, news, or facts not in a private doc.\n\
         2. PDF: Specific questions about files, documents, or uploaded content.\n\
         3. CHAT: Greetings, coding, math, or general conversation.\n\
         Query: \"{}\"\n\
         Output ONLY one word: WEB, PDF, or CHAT",
        query
    )
}

/// Classify a query. Greetings short-circuit; failures fail open to CHAT.
pub async fn classify(llm: &MistralClient, query: &str) -> Intent {
    if is_greeting(query) {
        return Intent::Chat;
    }

    let messages = vec![ChatMessage::user(classification_prompt(query))];

    match llm.chat_completion(messages, CLASSIFIER_MODEL, 0.0).await {
        Ok(answer) => Intent::from_answer(&answer),
        Err(err) => {
            warn!("Intent classification failed, defaulting to CHAT: {}", err);
            Intent::Chat
        }
    }
}
