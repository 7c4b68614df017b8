//! Retrieval orchestration and response generation.
//!
//! One pass per query: classify intent, resolve context (document index, web
//! search, or nothing), assemble the system prompt and generate the answer.
//! Retrieval failures are swallowed and fall through to the next policy step;
//! only a generation failure is surfaced, as an error-labelled response.

use std::fmt;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::CHAT_MODEL;
use crate::intent::{self, Intent};
use crate::llm::{ChatMessage, MistralClient};
use crate::search::{self, WebSearchClient};
use crate::index::DocumentSearch;
use crate::Result;

/// Persona used when the caller does not supply a usable one.
pub const DEFAULT_PERSONA: &str = "You are DocuChat, a helpful AI assistant.";

/// Personas at or below this length are ignored in favor of the default.
pub const MIN_PERSONA_CHARS: usize = 5;

/// Prior turns of conversation kept in the prompt.
pub const HISTORY_WINDOW: usize = 6;

/// Nearest matches requested from the document index.
pub const INDEX_TOP_K: u64 = 5;

/// Results requested from the web-search provider.
pub const WEB_RESULTS: usize = 3;

/// Human-readable tag for the context source that produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLabel {
    GeneralKnowledge,
    UploadedDocument,
    WebSearch,
    Error,
}

impl fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceLabel::GeneralKnowledge => "General Knowledge",
            SourceLabel::UploadedDocument => "Uploaded Document",
            SourceLabel::WebSearch => "Web Search",
            SourceLabel::Error => "Error",
        };
        write!(f, "{}", label)
    }
}

/// One inbound query with its generation settings.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub query: String,
    /// Prior turns, role-tagged with `user` / `model`
    pub history: Vec<ChatMessage>,
    pub use_web: bool,
    pub user_id: i64,
    pub persona: Option<String>,
    pub temperature: f32,
}

/// Generated answer plus the source that grounded it.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub text: String,
    pub source: SourceLabel,
}

/// The orchestration core: LLM plus optional retrieval backends.
///
/// Constructed once at process start and passed by reference to callers; the
/// engine itself holds no mutable state.
pub struct Engine {
    llm: MistralClient,
    search: Option<WebSearchClient>,
    index: Option<Box<dyn DocumentSearch>>,
}

impl Engine {
    pub fn new(
        llm: MistralClient,
        search: Option<WebSearchClient>,
        index: Option<Box<dyn DocumentSearch>>,
    ) -> Self {
        Self { llm, search, index }
    }

    /// Answer one query end to end.
    pub async fn answer(&self, req: &AgentRequest) -> AgentResponse {
        let intent = intent::classify(&self.llm, &req.query).await;
        debug!("Query classified as {}", intent.as_str());

        let (context, source) = self.retrieve(&req.query, intent, req.user_id, req.use_web).await;

        let persona = resolve_persona(req.persona.as_deref());
        let today = Utc::now().date_naive().to_string();
        let system_prompt = build_system_prompt(persona, &today, source, &context);

        let mut messages = Vec::with_capacity(req.history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));

        let start = req.history.len().saturating_sub(HISTORY_WINDOW);
        for turn in &req.history[start..] {
            let role = if turn.role == "user" { "user" } else { "assistant" };
            messages.push(ChatMessage::new(
                role,
                turn.content.clone().unwrap_or_default(),
            ));
        }
        messages.push(ChatMessage::user(req.query.clone()));

        match self
            .llm
            .chat_completion(messages, CHAT_MODEL, req.temperature)
            .await
        {
            Ok(text) => AgentResponse { text, source },
            Err(err) => {
                warn!("Generation failed: {}", err);
                AgentResponse {
                    text: format!("I encountered an error: {}", err),
                    source: SourceLabel::Error,
                }
            }
        }
    }

    /// Resolve context for a query. First match wins; failures fall through.
    async fn retrieve(
        &self,
        query: &str,
        intent: Intent,
        user_id: i64,
        use_web: bool,
    ) -> (String, SourceLabel) {
        if intent::is_bare_greeting(query) {
            return (String::new(), SourceLabel::GeneralKnowledge);
        }

        if should_query_index(intent, self.index.is_some()) {
            if let Some(index) = &self.index {
                match index.search_chunks(user_id, query, INDEX_TOP_K).await {
                    Ok(texts) if !texts.is_empty() => {
                        return (texts.join("\n"), SourceLabel::UploadedDocument);
                    }
                    Ok(_) => {}
                    Err(err) => warn!("Document index search failed: {}", err),
                }
            }
        }

        if should_query_web(use_web, intent) {
            if let Some(search_client) = &self.search {
                match search_client.search(query, WEB_RESULTS).await {
                    Ok(hits) if !hits.is_empty() => {
                        let block = search::context_block(&hits);
                        if !block.is_empty() {
                            return (block, SourceLabel::WebSearch);
                        }
                    }
                    Ok(_) => {}
                    Err(err) => warn!("Web search failed: {}", err),
                }
            }
        }

        (String::new(), SourceLabel::GeneralKnowledge)
    }

    /// Delete every chunk stored in the document index.
    ///
    /// Clears the whole index, not just one user's documents; the session
    /// cleanup at the call site is user-scoped, this is not. Returns the
    /// number of chunks removed.
    pub async fn reset_memory(&self) -> Result<usize> {
        let Some(index) = &self.index else {
            return Ok(0);
        };

        warn!("Memory reset clears the entire document index for all users");
        index.clear_chunks().await
    }
}

/// Decide whether the document index should be consulted.
pub fn should_query_index(intent: Intent, index_available: bool) -> bool {
    intent == Intent::Pdf || (intent == Intent::Chat && index_available)
}

/// Decide whether to fall through to web search (once no context was found).
pub fn should_query_web(use_web: bool, intent: Intent) -> bool {
    use_web && (intent == Intent::Web || intent == Intent::Pdf)
}

/// Use the caller's persona only when it is longer than the minimum; else the
/// default. The check is on the raw string, no trimming.
pub fn resolve_persona(persona: Option<&str>) -> &str {
    match persona {
        Some(p) if p.chars().count() > MIN_PERSONA_CHARS => p,
        _ => DEFAULT_PERSONA,
    }
}

/// Assemble the final system prompt from persona, date, source and context.
pub fn build_system_prompt(
    persona: &str,
    today: &str,
    source: SourceLabel,
    context: &str,
) -> String {
    let context_line = if context.is_empty() {
        "None (Use internal knowledge)"
    } else {
        context
    };

    format!(
        "{}\n\n\
         CONTEXTUAL INFORMATION:\n\
         - Current Date: {}\n\
         - Context Source: {}\n\
         - Retrieved Context: {}\n\n\
         GUIDELINES:\n\
         - If context is provided, prioritize it for your answer.\n\
         - If the user asks for code, provide clean, commented code.\n\
         - If the user asks for math, use LaTeX formatting.",
        persona, today, source, context_line
    )
}
