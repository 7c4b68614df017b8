//! Embedding generation using the Mistral embeddings endpoint.

use std::env;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EMBED_MODEL;
use crate::{Error, Result};

const MISTRAL_API_URL: &str = "https://api.mistral.ai/v1";

/// Inputs longer than this are truncated before embedding.
const MAX_EMBED_CHARS: usize = 8000;

/// Client for generating text embeddings.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl EmbeddingClient {
    /// Create client from environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("MISTRAL_API_KEY")
            .map_err(|_| Error::InvalidArgument("MISTRAL_API_KEY is not set".to_string()))?;
        Self::new(api_key)
    }

    /// Create client with API key.
    pub fn new<S: Into<String>>(api_key: S) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "MISTRAL_API_KEY is empty".to_string(),
            ));
        }

        let http = Client::builder()
            .user_agent("docuchat/0.1.0")
            .build()
            .map_err(|e| Error::InvalidArgument(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: MISTRAL_API_URL.to_string(),
            model: EMBED_MODEL.to_string(),
        })
    }

    /// Create client against a custom endpoint (self-hosted gateway, tests).
    pub fn with_base_url<S: Into<String>>(api_key: S, base_url: S) -> Result<Self> {
        let mut client = Self::new(api_key)?;
        client.base_url = base_url.into();
        Ok(client)
    }

    /// Generate embedding for a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::LlmError("No embedding returned".to_string()))
    }

    /// Generate embeddings for multiple texts in batch.
    ///
    /// Empty or whitespace-only inputs get an empty vector back without an API
    /// call; long inputs are truncated to a fixed character budget.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let processed: Vec<String> = texts
            .iter()
            .map(|t| {
                let trimmed = t.trim();
                trimmed.chars().take(MAX_EMBED_CHARS).collect::<String>()
            })
            .filter(|t| !t.is_empty())
            .collect();

        if processed.is_empty() {
            return Ok(vec![Vec::new(); texts.len()]);
        }

        let requested = processed.len();
        let request = EmbedRequest {
            model: self.model.clone(),
            input: processed,
        };

        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::LlmError(format!("Embedding request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::LlmError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::LlmError(format!(
                "Embedding error {}: {}",
                status, text
            )));
        }

        let embed_response: EmbedResponse = serde_json::from_str(&text)
            .map_err(|e| Error::LlmError(format!("Invalid embedding response: {}", e)))?;

        if embed_response.data.len() != requested {
            return Err(Error::LlmError(format!(
                "Embedding count mismatch: requested {}, got {}",
                requested,
                embed_response.data.len()
            )));
        }

        info!("Generated {} embeddings", embed_response.data.len());

        // Map back to original indices (empty texts get empty vectors)
        let mut result = Vec::with_capacity(texts.len());
        let mut embed_iter = embed_response.data.into_iter();

        for text in texts {
            if text.trim().is_empty() {
                result.push(Vec::new());
            } else if let Some(entry) = embed_iter.next() {
                result.push(entry.embedding);
            }
        }

        Ok(result)
    }

    /// Embedding dimension for the current model.
    pub fn dimension(&self) -> usize {
        match self.model.as_str() {
            "mistral-embed" => 1024,
            _ => 1024, // default
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> EmbeddingClient {
        EmbeddingClient::with_base_url("test_key".to_string(), server.base_url()).expect("client")
    }

    #[test]
    fn test_dimension() {
        let client = EmbeddingClient::new("test_key").unwrap();
        assert_eq!(client.dimension(), 1024);
    }

    #[test]
    fn test_new_rejects_empty_key() {
        let err = EmbeddingClient::new("").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn embed_batch_short_circuits_on_empty_texts() {
        let client = EmbeddingClient::new("test_key").unwrap();

        let embeddings = client
            .embed_batch(&["   ".to_string(), "\n".to_string()])
            .await
            .unwrap();

        assert_eq!(embeddings.len(), 2);
        assert!(embeddings.iter().all(|e| e.is_empty()));
    }

    #[tokio::test]
    async fn embed_batch_empty_input_returns_empty() {
        let client = EmbeddingClient::new("test_key").unwrap();
        let embeddings = client.embed_batch(&[]).await.unwrap();
        assert!(embeddings.is_empty());
    }

    #[tokio::test]
    async fn embed_returns_vector() {
        let server = MockServer::start_async().await;

        let embed_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/embeddings")
                .header("Authorization", "Bearer test_key");
            then.status(200).json_body(json!({
                "data": [ { "embedding": [0.1, 0.2, 0.3] } ]
            }));
        });

        let embedding = client(&server).embed("hello world").await.unwrap();

        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
        embed_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn embed_batch_preserves_positions_of_empty_texts() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200).json_body(json!({
                "data": [
                    { "embedding": [1.0] },
                    { "embedding": [2.0] }
                ]
            }));
        });

        let embeddings = client(&server)
            .embed_batch(&["first".to_string(), "  ".to_string(), "third".to_string()])
            .await
            .unwrap();

        assert_eq!(embeddings.len(), 3);
        assert_eq!(embeddings[0], vec![1.0]);
        assert!(embeddings[1].is_empty());
        assert_eq!(embeddings[2], vec![2.0]);
    }

    #[tokio::test]
    async fn embed_batch_errors_when_response_is_short() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200).json_body(json!({
                "data": [ { "embedding": [1.0] } ]
            }));
        });

        let err = client(&server)
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("count mismatch"));
        assert!(msg.contains("requested 2"));
    }

    #[tokio::test]
    async fn embed_returns_error_on_non_success_status() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(401).body("unauthorized");
        });

        let err = client(&server).embed("hello").await.unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("Embedding error 401"));
        assert!(msg.contains("unauthorized"));
    }
}
