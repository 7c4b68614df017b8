//! Federated identity verification and role resolution.
//!
//! Token issuance and password hashing live outside this crate; all that
//! happens here is asking the identity provider whether an opaque ID token is
//! valid and which email it belongs to.

use reqwest::Client;
use serde::Deserialize;

use crate::{Error, Result};

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com";

/// Verifies federated login tokens against the provider's tokeninfo endpoint.
#[derive(Debug, Clone)]
pub struct IdentityVerifier {
    http: Client,
    base_url: String,
}

impl IdentityVerifier {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent("docuchat/0.1.0")
            .build()
            .map_err(|e| Error::InvalidArgument(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            base_url: TOKENINFO_URL.to_string(),
        })
    }

    /// Verifier against a custom endpoint (tests).
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Result<Self> {
        let mut verifier = Self::new()?;
        verifier.base_url = base_url.into();
        Ok(verifier)
    }

    /// Verify an ID token and return the verified email address.
    pub async fn verify(&self, id_token: &str) -> Result<String> {
        let response = self
            .http
            .get(format!("{}/tokeninfo", self.base_url))
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| Error::IdentityError(format!("tokeninfo request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::IdentityError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::IdentityError(format!(
                "Invalid token ({}): {}",
                status, text
            )));
        }

        let info: TokenInfo = serde_json::from_str(&text)
            .map_err(|e| Error::IdentityError(format!("Invalid tokeninfo response: {}", e)))?;

        info.email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::IdentityError("Token carries no email claim".to_string()))
    }
}

/// Admin when the email matches the configured admin address, else plain user.
pub fn resolve_role(email: &str, admin_email: &str) -> &'static str {
    if email == admin_email {
        "admin"
    } else {
        "user"
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_resolve_role_admin() {
        assert_eq!(resolve_role("boss@example.com", "boss@example.com"), "admin");
    }

    #[test]
    fn test_resolve_role_user() {
        assert_eq!(resolve_role("someone@example.com", "boss@example.com"), "user");
        // Exact match only
        assert_eq!(resolve_role("BOSS@example.com", "boss@example.com"), "user");
    }

    fn verifier(server: &MockServer) -> IdentityVerifier {
        IdentityVerifier::with_base_url(server.base_url()).expect("verifier")
    }

    #[tokio::test]
    async fn verify_returns_email() {
        let server = MockServer::start_async().await;

        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/tokeninfo")
                .query_param("id_token", "tok123");
            then.status(200).json_body(json!({
                "email": "user@example.com",
                "email_verified": "true"
            }));
        });

        let email = verifier(&server).verify("tok123").await.unwrap();

        assert_eq!(email, "user@example.com");
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn verify_rejects_invalid_token() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(GET).path("/tokeninfo");
            then.status(400).body("invalid_token");
        });

        let err = verifier(&server).verify("bad").await.unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("Invalid token"));
        assert!(msg.contains("invalid_token"));
    }

    #[tokio::test]
    async fn verify_rejects_missing_email_claim() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(GET).path("/tokeninfo");
            then.status(200).json_body(json!({ "sub": "12345" }));
        });

        let err = verifier(&server).verify("tok").await.unwrap_err();
        assert!(err.to_string().contains("no email claim"));
    }
}
