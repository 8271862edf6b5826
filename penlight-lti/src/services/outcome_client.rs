//! LMS outcome service HTTP client
//!
//! **[LTI-NET-010]** Posts signed POX envelopes to a journal's grade_url.
//! The request timeout is bounded so a hung LMS endpoint cannot starve the
//! sweep's worker pool; transport failures surface as values, the
//! orchestrator decides what they mean for coupling state.

use crate::config::LtiCredentials;
use crate::lti::oauth;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "Penlight-LTI/0.1.0";
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Outcome transport errors
#[derive(Debug, Error)]
pub enum OutcomeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("LMS endpoint returned {0}: {1}")]
    Endpoint(u16, String),

    #[error("Request signing error: {0}")]
    Signing(String),
}

/// HTTP client for LTI Basic Outcomes endpoints
pub struct OutcomeClient {
    http_client: reqwest::Client,
}

impl OutcomeClient {
    pub fn new() -> Result<Self, OutcomeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| OutcomeError::Network(e.to_string()))?;

        Ok(Self { http_client })
    }

    /// POST a POX envelope to the outcome service, returning the raw
    /// response body
    ///
    /// The body is signed via oauth_body_hash and the OAuth parameters
    /// travel in the Authorization header.
    pub async fn post_outcome(
        &self,
        grade_url: &str,
        xml: String,
        credentials: &LtiCredentials,
    ) -> Result<String, OutcomeError> {
        let params = oauth::sign_with_body(
            "POST",
            grade_url,
            &xml,
            &credentials.consumer_key,
            &credentials.consumer_secret,
        )
        .map_err(|e| OutcomeError::Signing(e.to_string()))?;

        tracing::debug!(grade_url = %grade_url, bytes = xml.len(), "Posting outcome envelope");

        let response = self
            .http_client
            .post(grade_url)
            .header(CONTENT_TYPE, "application/xml")
            .header(AUTHORIZATION, oauth::authorization_header(&params))
            .body(xml)
            .send()
            .await
            .map_err(|e| OutcomeError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(OutcomeError::Endpoint(status.as_u16(), error_text));
        }

        response
            .text()
            .await
            .map_err(|e| OutcomeError::Network(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> LtiCredentials {
        LtiCredentials {
            consumer_key: "k".to_string(),
            consumer_secret: "s".to_string(),
        }
    }

    #[test]
    fn client_creation_succeeds() {
        assert!(OutcomeClient::new().is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let client = OutcomeClient::new().unwrap();
        // Port 9 (discard) is essentially never listening locally
        let result = client
            .post_outcome("http://127.0.0.1:9/grades", "<x/>".to_string(), &credentials())
            .await;

        assert!(matches!(result, Err(OutcomeError::Network(_))));
    }

    #[tokio::test]
    async fn invalid_grade_url_is_a_signing_error() {
        let client = OutcomeClient::new().unwrap();
        let result = client
            .post_outcome("not a url", "<x/>".to_string(), &credentials())
            .await;

        assert!(matches!(result, Err(OutcomeError::Signing(_))));
    }
}
