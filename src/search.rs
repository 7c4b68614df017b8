//! Tavily web-search client and context-block assembly.

use std::env;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const TAVILY_API_URL: &str = "https://api.tavily.com";

/// Characters of result body kept per hit when assembling context.
pub const SNIPPET_CHARS: usize = 400;

/// Web-search client.
#[derive(Debug, Clone)]
pub struct WebSearchClient {
    http: Client,
    api_key: String,
    base_url: String,
}

/// Single web-search result.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub content: String,
}

impl WebSearchClient {
    /// Create client from environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("TAVILY_API_KEY")
            .map_err(|_| Error::InvalidArgument("TAVILY_API_KEY is not set".to_string()))?;
        Self::new(api_key)
    }

    /// Create client with API key.
    pub fn new<S: Into<String>>(api_key: S) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::InvalidArgument("TAVILY_API_KEY is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent("docuchat/0.1.0")
            .build()
            .map_err(|e| Error::InvalidArgument(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: TAVILY_API_URL.to_string(),
        })
    }

    /// Create client against a custom endpoint (tests).
    pub fn with_base_url<S: Into<String>>(api_key: S, base_url: S) -> Result<Self> {
        let mut client = Self::new(api_key)?;
        client.base_url = base_url.into();
        Ok(client)
    }

    /// Run a search and return the raw hits.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let request = SearchRequest {
            api_key: self.api_key.clone(),
            query: query.to_string(),
            max_results,
            search_depth: "advanced".to_string(),
        };

        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::SearchError(format!("Tavily request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::SearchError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::SearchError(format!(
                "Tavily error {}: {}",
                status, text
            )));
        }

        let search_response: SearchResponse = serde_json::from_str(&text)
            .map_err(|e| Error::SearchError(format!("Invalid response: {}", e)))?;

        Ok(search_response.results)
    }
}

/// Format hits into the context block injected into the system prompt.
///
/// Each body is truncated to a fixed snippet length. Returns an empty string
/// for no hits.
pub fn context_block(hits: &[SearchHit]) -> String {
    let mut context = String::new();
    for hit in hits {
        context.push_str(&format!(
            "Source: {}\nContent: {}\n---\n",
            hit.title,
            truncate_chars(&hit.content, SNIPPET_CHARS)
        ));
    }
    context
}

/// Truncate to at most `max` characters, respecting UTF-8 boundaries.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest {
    api_key: String,
    query: String,
    max_results: usize,
    search_depth: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> WebSearchClient {
        WebSearchClient::with_base_url("test_key".to_string(), server.base_url()).expect("client")
    }

    #[test]
    fn test_new_rejects_empty_key() {
        let err = WebSearchClient::new(" ").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_truncate_chars_short_text() {
        assert_eq!(truncate_chars("short", 400), "short");
    }

    #[test]
    fn test_truncate_chars_long_text() {
        let text = "a".repeat(500);
        assert_eq!(truncate_chars(&text, 400).len(), 400);
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        let text = "я".repeat(500);
        let truncated = truncate_chars(&text, 400);
        assert_eq!(truncated.chars().count(), 400);
    }

    #[test]
    fn test_context_block_empty_hits() {
        assert!(context_block(&[]).is_empty());
    }

    #[test]
    fn test_context_block_formats_hits() {
        let hits = vec![
            SearchHit {
                title: "First".to_string(),
                content: "first body".to_string(),
            },
            SearchHit {
                title: "Second".to_string(),
                content: "x".repeat(600),
            },
        ];

        let block = context_block(&hits);

        assert!(block.contains("Source: First\nContent: first body\n---\n"));
        assert!(block.contains("Source: Second"));
        // Second body truncated to the snippet budget
        assert!(!block.contains(&"x".repeat(401)));
        assert!(block.contains(&"x".repeat(400)));
    }

    #[tokio::test]
    async fn search_returns_hits() {
        let server = MockServer::start_async().await;

        let search_mock = server.mock(|when, then| {
            when.method(POST).path("/search").is_true(|req| {
                let body = String::from_utf8_lossy(req.body().as_ref());
                body.contains("\"max_results\":3") && body.contains("interest rates")
            });
            then.status(200).json_body(json!({
                "results": [
                    { "title": "News", "content": "rates went up" },
                    { "title": "More news", "content": "rates went down" }
                ]
            }));
        });

        let hits = client(&server)
            .search("Latest news on interest rates", 3)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "News");
        search_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn search_returns_error_on_non_success_status() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/search");
            then.status(403).body("forbidden");
        });

        let err = client(&server).search("query", 3).await.unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("Tavily error 403"));
        assert!(msg.contains("forbidden"));
    }

    #[tokio::test]
    async fn search_tolerates_missing_results_field() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/search");
            then.status(200).json_body(json!({}));
        });

        let hits = client(&server).search("query", 3).await.unwrap();
        assert!(hits.is_empty());
    }
}
