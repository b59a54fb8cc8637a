use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::assertion::JwtAssertion;
use crate::credential::GOOGLE_TOKEN_URI;
use crate::errors::{AuthExchangeError, FcmAuthError};
use crate::models::{
    AccessToken, GoogleTokenResponse, ASSERTION_LIFETIME_SECS, JWT_BEARER_GRANT_TYPE,
};

/// Default bound on the token exchange round trip
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Exchanges signed assertions for bearer access tokens
///
/// Every call consumes one freshly minted assertion. A rejected exchange must
/// be retried with a new assertion, never by replaying the old one.
#[derive(Clone)]
pub struct TokenExchangeClient {
    http_client: reqwest::Client,
    token_endpoint: String,
    timeout: Duration,
}

impl TokenExchangeClient {
    /// Create a client for the Google token endpoint
    pub fn new(timeout: Duration) -> Result<Self, FcmAuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                FcmAuthError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self::with_http_client(http_client, GOOGLE_TOKEN_URI, timeout))
    }

    /// Create a client on top of an existing HTTP client
    pub fn with_http_client(
        http_client: reqwest::Client,
        token_endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            token_endpoint: token_endpoint.into(),
            timeout,
        }
    }

    /// Point the client at another token endpoint (emulators, tests).
    ///
    /// The assertion audience stays the Google token URI.
    pub fn with_endpoint(mut self, token_endpoint: impl Into<String>) -> Self {
        self.token_endpoint = token_endpoint.into();
        self
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    /// Exchange an assertion for an access token
    pub async fn exchange(&self, assertion: &JwtAssertion) -> Result<AccessToken, FcmAuthError> {
        let now = Utc::now().timestamp();
        if !assertion.is_valid_at(now) {
            let claims = assertion.claims();
            warn!(
                issued_at = claims.iat,
                expires_at = claims.exp,
                now,
                "Refusing to exchange assertion outside its validity window"
            );
            return Err(AuthExchangeError::StaleAssertion {
                issued_at: claims.iat,
                expires_at: claims.exp,
                now,
            }
            .into());
        }

        let params = [
            ("grant_type", JWT_BEARER_GRANT_TYPE),
            ("assertion", assertion.as_str()),
        ];

        let (status, body) = self
            .bounded(async {
                let response = self
                    .http_client
                    .post(&self.token_endpoint)
                    .form(&params)
                    .send()
                    .await?;
                let status = response.status();
                let body = response.text().await?;
                Ok::<_, reqwest::Error>((status, body))
            })
            .await?;

        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                issuer = %assertion.claims().iss,
                "Token endpoint rejected assertion"
            );
            return Err(AuthExchangeError::Rejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let token_response: GoogleTokenResponse =
            serde_json::from_str(&body).map_err(|e| AuthExchangeError::MalformedResponse {
                reason: e.to_string(),
                body: body.clone(),
            })?;

        if token_response.access_token.is_empty() {
            return Err(AuthExchangeError::MalformedResponse {
                reason: "access_token is empty".to_string(),
                body,
            }
            .into());
        }

        let expires_in = token_response.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        let expires_at = Some(expires_in)
            .filter(|secs| *secs > 0)
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| AuthExchangeError::MalformedResponse {
                reason: format!("expires_in out of range: {}", expires_in),
                body,
            })?;

        debug!(
            issuer = %assertion.claims().iss,
            expires_in,
            token_type = ?token_response.token_type,
            "Exchanged assertion for access token"
        );

        Ok(AccessToken::new(token_response.access_token, expires_at))
    }

    async fn bounded<F, T>(&self, future: F) -> Result<T, AuthExchangeError>
    where
        F: Future<Output = Result<T, reqwest::Error>>,
    {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_timeout() => Err(AuthExchangeError::Timeout(self.timeout)),
            Ok(Err(e)) => Err(AuthExchangeError::Transport(e.to_string())),
            Err(_) => Err(AuthExchangeError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let client = TokenExchangeClient::new(DEFAULT_EXCHANGE_TIMEOUT).unwrap();
        assert_eq!(client.token_endpoint(), "https://oauth2.googleapis.com/token");

        let client = client.with_endpoint("http://127.0.0.1:8085/token");
        assert_eq!(client.token_endpoint(), "http://127.0.0.1:8085/token");
    }
}
