//! Integration tests for the docuchat library
//!
//! These tests verify the public API and module interactions.

use docuchat::{
    auth::resolve_role,
    config::{CHAT_MODEL, CLASSIFIER_MODEL, DEFAULT_TEMPERATURE, EMBED_MODEL},
    engine::{
        build_system_prompt, resolve_persona, should_query_index, should_query_web,
        SourceLabel, DEFAULT_PERSONA, HISTORY_WINDOW, INDEX_TOP_K, WEB_RESULTS,
    },
    error::{Error, Result},
    ingest::{chunk_text, CHUNK_SIZE, CHUNK_STRIDE},
    intent::{is_bare_greeting, is_greeting, Intent, BARE_GREETINGS, CLASSIFIER_GREETINGS},
    store::{session_title, FEDERATED_LOGIN_SENTINEL},
    ChatMessage,
};

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_model_constants() {
    assert_eq!(CHAT_MODEL, "mistral-large-latest");
    assert_eq!(CLASSIFIER_MODEL, "mistral-small-latest");
    assert_eq!(EMBED_MODEL, "mistral-embed");
    assert!((DEFAULT_TEMPERATURE - 0.3).abs() < f32::EPSILON);
}

// ============================================================================
// Error Tests
// ============================================================================

#[test]
fn test_error_variants_display() {
    let errors = vec![
        Error::DatabaseError("db down".into()),
        Error::IndexError("no collection".into()),
        Error::LlmError("rate limit".into()),
        Error::SearchError("bad key".into()),
        Error::IngestError("not a pdf".into()),
        Error::EmailTaken("a@b.c".into()),
        Error::InvalidCredentials,
        Error::IdentityError("bad token".into()),
        Error::NotFound("session".into()),
        Error::SerializationError("json".into()),
        Error::InvalidArgument("bad arg".into()),
        Error::ConnectionError("timeout".into()),
        Error::Unknown("mystery".into()),
    ];

    for err in errors {
        let msg = err.to_string();
        assert!(!msg.is_empty(), "Error message should not be empty");
    }
}

#[test]
fn test_result_type_alias() {
    fn returns_ok() -> Result<i32> {
        Ok(42)
    }

    fn returns_err() -> Result<i32> {
        Err(Error::Unknown("test".into()))
    }

    assert!(returns_ok().is_ok());
    assert!(returns_err().is_err());
}

// ============================================================================
// Intent Tests
// ============================================================================

#[test]
fn test_greeting_lists() {
    assert_eq!(CLASSIFIER_GREETINGS.len(), 5);
    assert_eq!(BARE_GREETINGS.len(), 3);

    // Every bare greeting is also a classifier greeting
    for greeting in BARE_GREETINGS {
        assert!(CLASSIFIER_GREETINGS.contains(greeting));
    }
}

#[test]
fn test_greeting_matching_is_trimmed_and_case_insensitive() {
    assert!(is_greeting("  HELLO "));
    assert!(is_bare_greeting("\tHey\n"));
    assert!(!is_greeting("hello world"));
    assert!(!is_bare_greeting("how are you"));
}

#[test]
fn test_intent_answer_mapping() {
    assert_eq!(Intent::from_answer("WEB"), Intent::Web);
    assert_eq!(Intent::from_answer("pdf "), Intent::Pdf);
    assert_eq!(Intent::from_answer("UNSURE"), Intent::Chat);
}

// ============================================================================
// Retrieval Policy Tests
// ============================================================================

#[test]
fn test_index_consulted_for_pdf_and_available_chat() {
    assert!(should_query_index(Intent::Pdf, false));
    assert!(should_query_index(Intent::Chat, true));
    assert!(!should_query_index(Intent::Chat, false));
    assert!(!should_query_index(Intent::Web, true));
}

#[test]
fn test_web_requires_flag_and_intent() {
    assert!(should_query_web(true, Intent::Web));
    assert!(should_query_web(true, Intent::Pdf));
    assert!(!should_query_web(false, Intent::Web));
    assert!(!should_query_web(true, Intent::Chat));
}

#[test]
fn test_retrieval_constants() {
    assert_eq!(INDEX_TOP_K, 5);
    assert_eq!(WEB_RESULTS, 3);
    assert_eq!(HISTORY_WINDOW, 6);
}

// ============================================================================
// Prompt Assembly Tests
// ============================================================================

#[test]
fn test_persona_length_rule() {
    assert_eq!(resolve_persona(Some("short")), DEFAULT_PERSONA);
    assert_eq!(resolve_persona(Some("longer persona")), "longer persona");
    assert_eq!(resolve_persona(None), DEFAULT_PERSONA);
}

#[test]
fn test_source_labels() {
    assert_eq!(SourceLabel::GeneralKnowledge.to_string(), "General Knowledge");
    assert_eq!(SourceLabel::UploadedDocument.to_string(), "Uploaded Document");
    assert_eq!(SourceLabel::WebSearch.to_string(), "Web Search");
    assert_eq!(SourceLabel::Error.to_string(), "Error");
}

#[test]
fn test_prompt_contains_all_sections() {
    let prompt = build_system_prompt(
        DEFAULT_PERSONA,
        "2026-01-15",
        SourceLabel::WebSearch,
        "some web context",
    );

    assert!(prompt.contains(DEFAULT_PERSONA));
    assert!(prompt.contains("Current Date: 2026-01-15"));
    assert!(prompt.contains("Context Source: Web Search"));
    assert!(prompt.contains("some web context"));
    assert!(prompt.contains("GUIDELINES"));
}

// ============================================================================
// Chunker Tests
// ============================================================================

#[test]
fn test_chunk_window_constants() {
    assert_eq!(CHUNK_SIZE, 1000);
    assert_eq!(CHUNK_STRIDE, 800);
}

#[test]
fn test_chunk_count_formula_across_lengths() {
    let cases = [
        (0usize, 0usize),
        (1, 1),
        (1000, 1),
        (1001, 2),
        (1800, 2),
        (2400, 3),
        (2401, 3),
        (3400, 4),
    ];

    for (len, expected) in cases {
        let text = "x".repeat(len);
        let chunks = chunk_text(&text, 1, "doc.pdf");
        assert_eq!(chunks.len(), expected, "len {}", len);
    }
}

#[test]
fn test_chunks_are_scoped_to_user() {
    let chunks = chunk_text(&"x".repeat(1500), 99, "report.pdf");
    assert!(chunks.iter().all(|c| c.user_id == 99));
    assert!(chunks.iter().all(|c| c.filename == "report.pdf"));
}

// ============================================================================
// Store Helper Tests
// ============================================================================

#[test]
fn test_session_title_prefix() {
    let title = session_title("What's in my uploaded contract? Please summarize.");
    assert_eq!(title.chars().count(), 33);
    assert!(title.ends_with("..."));
    assert!(title.starts_with("What's in my uploaded contract"));
}

#[test]
fn test_federated_sentinel_is_not_a_plausible_hash() {
    assert_eq!(FEDERATED_LOGIN_SENTINEL, "FEDERATED_LOGIN");
}

#[test]
fn test_role_resolution() {
    assert_eq!(resolve_role("admin@site.io", "admin@site.io"), "admin");
    assert_eq!(resolve_role("user@site.io", "admin@site.io"), "user");
}

// ============================================================================
// Message Tests
// ============================================================================

#[test]
fn test_chat_message_roles() {
    assert_eq!(ChatMessage::system("x").role, "system");
    assert_eq!(ChatMessage::user("x").role, "user");
    assert_eq!(ChatMessage::assistant("x").role, "assistant");
    assert_eq!(ChatMessage::new("model", "x").role, "model");
}
