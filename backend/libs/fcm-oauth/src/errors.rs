use std::time::Duration;

use thiserror::Error;

/// FCM OAuth error types
#[derive(Error, Debug)]
pub enum FcmAuthError {
    /// Credential blob absent, malformed, or missing required fields.
    /// Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Private key could not be imported or the signer rejected it.
    /// Fatal per request, the key will not change between attempts.
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Token exchange failed: {0}")]
    AuthExchange(#[from] AuthExchangeError),
}

/// Failures of the assertion-for-access-token exchange
#[derive(Error, Debug)]
pub enum AuthExchangeError {
    #[error("token endpoint rejected assertion with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to parse token response ({reason}): {body}")]
    MalformedResponse { reason: String, body: String },

    #[error("token request failed: {0}")]
    Transport(String),

    #[error("token request timed out after {0:?}")]
    Timeout(Duration),

    #[error("assertion outside its validity window (iat={issued_at}, exp={expires_at}, now={now})")]
    StaleAssertion {
        issued_at: i64,
        expires_at: i64,
        now: i64,
    },
}

impl FcmAuthError {
    /// Whether a new attempt (with a freshly minted assertion) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FcmAuthError::Configuration(_) | FcmAuthError::Crypto(_) => false,
            FcmAuthError::AuthExchange(e) => e.is_retryable(),
        }
    }

    /// Raw provider body, if the token endpoint answered.
    pub fn provider_body(&self) -> Option<&str> {
        match self {
            FcmAuthError::AuthExchange(AuthExchangeError::Rejected { body, .. })
            | FcmAuthError::AuthExchange(AuthExchangeError::MalformedResponse { body, .. }) => {
                Some(body)
            }
            _ => None,
        }
    }
}

impl AuthExchangeError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AuthExchangeError::Rejected { status, .. } => *status == 429 || *status >= 500,
            AuthExchangeError::MalformedResponse { .. } => false,
            AuthExchangeError::Transport(_)
            | AuthExchangeError::Timeout(_)
            | AuthExchangeError::StaleAssertion { .. } => true,
        }
    }
}
