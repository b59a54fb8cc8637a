/// Error types for Notification Service
///
/// Every failure of a dispatch request is one of these. They are converted
/// into a `DispatchResponse` at the request boundary and never crash the
/// process.
use std::time::Duration;

use fcm_oauth::{AuthExchangeError, FcmAuthError};
use reqwest::StatusCode;
use thiserror::Error;

use crate::models::ProviderError;

/// Result type for notification-service operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad or missing configuration, fatal at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed caller input, never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Credential, signing or token exchange failure
    #[error(transparent)]
    Auth(#[from] FcmAuthError),

    /// FCM rejected or did not answer the send
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("FCM API error {status}: {}", .error.message)]
    Provider { status: u16, error: ProviderError },

    #[error("FCM API error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("FCM send request failed: {0}")]
    Transport(String),

    #[error("FCM send timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to parse FCM response ({reason}): {body}")]
    MalformedResponse { reason: String, body: String },
}

/// Coarse error classes of the dispatch pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Crypto,
    AuthExchange,
    Validation,
    Delivery,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::Crypto => "crypto_error",
            ErrorKind::AuthExchange => "auth_exchange_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::Delivery => "delivery_error",
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Configuration(_) | AppError::Auth(FcmAuthError::Configuration(_)) => {
                ErrorKind::Configuration
            }
            AppError::Auth(FcmAuthError::Crypto(_)) => ErrorKind::Crypto,
            AppError::Auth(FcmAuthError::AuthExchange(_)) => ErrorKind::AuthExchange,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Delivery(_) => ErrorKind::Delivery,
        }
    }

    /// Whether the caller may try the same request again later
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Configuration(_) | AppError::Validation(_) => false,
            AppError::Auth(e) => e.is_retryable(),
            AppError::Delivery(e) => e.is_retryable(),
        }
    }

    /// HTTP status a front-end should answer with
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(FcmAuthError::AuthExchange(AuthExchangeError::Timeout(_)))
            | AppError::Delivery(DeliveryError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Auth(FcmAuthError::AuthExchange(AuthExchangeError::Rejected { .. }))
            | AppError::Delivery(DeliveryError::Provider { .. })
            | AppError::Delivery(DeliveryError::Http { .. }) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable message, preferring the provider's own wording
    pub fn user_message(&self) -> String {
        match self {
            AppError::Delivery(DeliveryError::Provider { error, .. }) => error.message.clone(),
            AppError::Auth(FcmAuthError::AuthExchange(AuthExchangeError::Rejected {
                body,
                ..
            })) => oauth_error_description(body)
                .map(|description| format!("Failed to authenticate with FCM: {}", description))
                .unwrap_or_else(|| self.to_string()),
            _ => self.to_string(),
        }
    }
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Provider { status, .. } | DeliveryError::Http { status, .. } => {
                *status == 429 || *status >= 500
            }
            DeliveryError::Transport(_) | DeliveryError::Timeout(_) => true,
            DeliveryError::MalformedResponse { .. } => false,
        }
    }

    /// HTTP status returned by FCM, if it answered
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Provider { status, .. } | DeliveryError::Http { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// `error_description` (or `error`) of an OAuth error body
fn oauth_error_description(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error_description")
        .or_else(|| value.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
