//! Configuration for external services
//!
//! Everything is driven by environment variables (a `.env` file is honored via
//! `dotenvy` at startup). Only the Mistral API key is mandatory; web search and
//! the document index degrade gracefully when their settings are absent.

use mysql_async::OptsBuilder;

use crate::{Error, Result};

/// Model used for response generation.
pub const CHAT_MODEL: &str = "mistral-large-latest";
/// Model used for intent classification.
pub const CLASSIFIER_MODEL: &str = "mistral-small-latest";
/// Model used for document embeddings.
pub const EMBED_MODEL: &str = "mistral-embed";

/// Temperature applied when the caller does not supply one.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub mistral_api_key: String,
    pub tavily_api_key: Option<String>,
    pub qdrant_url: String,
    pub admin_email: String,
    pub mysql_host: String,
    pub mysql_port: u16,
    pub mysql_database: String,
    pub mysql_user: String,
    pub mysql_password: String,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Fails only when `MISTRAL_API_KEY` is missing; every other value has a
    /// default or is optional.
    pub fn from_env() -> Result<Self> {
        let mistral_api_key = std::env::var("MISTRAL_API_KEY")
            .map_err(|_| Error::InvalidArgument("MISTRAL_API_KEY is not set".to_string()))?;

        let tavily_api_key = std::env::var("TAVILY_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let mysql_port: u16 = std::env::var("MYSQL_PORT")
            .unwrap_or_else(|_| "3306".to_string())
            .parse()
            .map_err(|e| Error::ConnectionError(format!("Invalid MYSQL_PORT: {}", e)))?;

        Ok(Self {
            mistral_api_key,
            tavily_api_key,
            qdrant_url: std::env::var("QDRANT_URL")
                .unwrap_or_else(|_| DEFAULT_QDRANT_URL.to_string()),
            admin_email: std::env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_string()),
            mysql_host: std::env::var("MYSQL_HOST").unwrap_or_else(|_| "localhost".to_string()),
            mysql_port,
            mysql_database: std::env::var("MYSQL_DATABASE")
                .unwrap_or_else(|_| "docuchat".to_string()),
            mysql_user: std::env::var("MYSQL_USER").unwrap_or_else(|_| "docuchat".to_string()),
            mysql_password: std::env::var("MYSQL_PASSWORD").unwrap_or_default(),
        })
    }

    /// MySQL connection options for the session/credential store.
    pub fn mysql_opts(&self) -> OptsBuilder {
        OptsBuilder::default()
            .ip_or_hostname(self.mysql_host.clone())
            .tcp_port(self.mysql_port)
            .db_name(Some(self.mysql_database.clone()))
            .user(Some(self.mysql_user.clone()))
            .pass(Some(self.mysql_password.clone()))
    }

    /// Web search is only enabled when a Tavily key is configured.
    pub fn web_search_enabled(&self) -> bool {
        self.tavily_api_key.is_some()
    }
}
