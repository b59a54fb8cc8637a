/// FCM HTTP v1 dispatcher
///
/// Sends envelopes to `{base}/v1/projects/{project_id}/messages:send` with a
/// bearer token from an `AccessTokenProvider`. Multicast is one operation
/// that fans out one v1 send per token, at most `multicast_concurrency` in
/// flight, and aggregates the outcomes in input order. Nothing is retried here.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fcm_oauth::{AccessToken, AccessTokenProvider};
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::dispatcher::Dispatcher;
use crate::error::{AppError, DeliveryError, Result};
use crate::models::{
    Destination, DispatchResult, FcmApiResponse, FcmMessage, NotificationEnvelope, ProviderError,
    SendOutcome, Target,
};

pub const DEFAULT_FCM_BASE_URL: &str = "https://fcm.googleapis.com";

/// Sends in flight at once for a single multicast
pub const DEFAULT_MULTICAST_CONCURRENCY: usize = 100;

pub struct FcmHttpV1Dispatcher {
    http_client: reqwest::Client,
    tokens: Arc<dyn AccessTokenProvider>,
    base_url: String,
    project_id: String,
    timeout: Duration,
    validate_only: bool,
    multicast_concurrency: usize,
}

impl FcmHttpV1Dispatcher {
    pub fn new(
        project_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenProvider>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            tokens,
            base_url: DEFAULT_FCM_BASE_URL.to_string(),
            project_id: project_id.into(),
            timeout,
            validate_only: false,
            multicast_concurrency: DEFAULT_MULTICAST_CONCURRENCY,
        })
    }

    /// Send to another API host (emulators, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Ask FCM to validate messages without delivering them
    pub fn with_validate_only(mut self, validate_only: bool) -> Self {
        self.validate_only = validate_only;
        self
    }

    pub fn with_multicast_concurrency(mut self, limit: usize) -> Self {
        self.multicast_concurrency = limit.max(1);
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.project_id
        )
    }

    async fn send_one(
        &self,
        access_token: &AccessToken,
        envelope: &NotificationEnvelope,
        destination: Destination<'_>,
    ) -> std::result::Result<Option<String>, DeliveryError> {
        let message = FcmMessage::new(envelope, destination, self.validate_only);

        let (status, body) = self
            .bounded(async {
                let response = self
                    .http_client
                    .post(self.send_url())
                    .bearer_auth(access_token.secret())
                    .json(&message)
                    .send()
                    .await?;
                let status = response.status();
                let body = response.text().await?;
                Ok::<_, reqwest::Error>((status, body))
            })
            .await?;

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate().await;
            }

            let error = match ProviderError::from_body(&body) {
                Some(error) => DeliveryError::Provider {
                    status: status.as_u16(),
                    error,
                },
                None => DeliveryError::Http {
                    status: status.as_u16(),
                    body,
                },
            };
            warn!(status = status.as_u16(), error = %error, "FCM rejected message");
            return Err(error);
        }

        let response: FcmApiResponse =
            serde_json::from_str(&body).map_err(|e| DeliveryError::MalformedResponse {
                reason: e.to_string(),
                body: body.clone(),
            })?;

        Ok(response.name)
    }

    async fn send_multicast(
        &self,
        access_token: &AccessToken,
        envelope: &NotificationEnvelope,
        device_tokens: &[String],
    ) -> DispatchResult {
        let sends = device_tokens.iter().map(|device_token| async move {
            let outcome = self
                .send_one(access_token, envelope, Destination::Token(device_token))
                .await;
            match outcome {
                Ok(message_id) => SendOutcome {
                    token: device_token.clone(),
                    success: true,
                    message_id,
                    error: None,
                    error_code: None,
                },
                Err(e) => SendOutcome {
                    token: device_token.clone(),
                    success: false,
                    message_id: None,
                    error: Some(outcome_message(&e)),
                    error_code: outcome_code(&e),
                },
            }
        });
        let sends = stream::iter(sends.collect::<Vec<_>>());

        // buffered, not buffer_unordered: outcomes must line up with the input tokens
        let outcomes: Vec<SendOutcome> = sends
            .buffered(self.multicast_concurrency)
            .collect()
            .await;
        DispatchResult::multicast(outcomes)
    }

    async fn bounded<F, T>(&self, future: F) -> std::result::Result<T, DeliveryError>
    where
        F: Future<Output = std::result::Result<T, reqwest::Error>>,
    {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_timeout() => Err(DeliveryError::Timeout(self.timeout)),
            Ok(Err(e)) => Err(DeliveryError::Transport(e.to_string())),
            Err(_) => Err(DeliveryError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl Dispatcher for FcmHttpV1Dispatcher {
    async fn dispatch(&self, envelope: &NotificationEnvelope) -> Result<DispatchResult> {
        let access_token = self.tokens.access_token().await?;
        debug!(
            issuer = %self.tokens.identity(),
            target = envelope.target().kind(),
            "Obtained FCM access token"
        );

        let result = match envelope.target() {
            Target::Topic(topic) => {
                let message_id = self
                    .send_one(&access_token, envelope, Destination::Topic(topic))
                    .await?;
                info!(topic = %topic, message_id = ?message_id, "Sent FCM topic message");
                DispatchResult::single(message_id)
            }
            Target::Token(device_token) => {
                let message_id = self
                    .send_one(&access_token, envelope, Destination::Token(device_token))
                    .await?;
                info!(message_id = ?message_id, "Sent FCM message to device");
                DispatchResult::single(message_id)
            }
            Target::Tokens(device_tokens) => {
                let result = self
                    .send_multicast(&access_token, envelope, device_tokens)
                    .await;
                info!(
                    tokens = device_tokens.len(),
                    success_count = result.success_count.unwrap_or(0),
                    failure_count = result.failure_count.unwrap_or(0),
                    "Sent FCM multicast"
                );
                result
            }
        };

        Ok(result)
    }
}

/// Human-readable per-token failure, preferring FCM's own message
fn outcome_message(error: &DeliveryError) -> String {
    match error {
        DeliveryError::Provider { error, .. } if !error.message.is_empty() => {
            error.message.clone()
        }
        other => other.to_string(),
    }
}

/// FCM error code, e.g. `UNREGISTERED`, falling back to the RPC status
fn outcome_code(error: &DeliveryError) -> Option<String> {
    match error {
        DeliveryError::Provider { error, .. } => {
            error.error_code.clone().or_else(|| error.status.clone())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fcm_oauth::FcmAuthError;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::PushDefaults;
    use crate::models::NotificationRequest;
    use crate::services::PayloadBuilder;

    struct StaticToken;

    #[async_trait]
    impl AccessTokenProvider for StaticToken {
        fn identity(&self) -> &str {
            "svc@example.iam"
        }

        async fn access_token(&self) -> std::result::Result<AccessToken, FcmAuthError> {
            Ok(AccessToken::new(
                "ya29.static",
                Utc::now() + chrono::Duration::hours(1),
            ))
        }
    }

    #[test]
    fn test_send_url() {
        let dispatcher = FcmHttpV1Dispatcher::new(
            "campus-connect-23fae",
            Arc::new(StaticToken),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            dispatcher.send_url(),
            "https://fcm.googleapis.com/v1/projects/campus-connect-23fae/messages:send"
        );

        let dispatcher = dispatcher.with_base_url("http://127.0.0.1:9099/");
        assert_eq!(
            dispatcher.send_url(),
            "http://127.0.0.1:9099/v1/projects/campus-connect-23fae/messages:send"
        );
    }

    #[tokio::test]
    async fn test_multicast_keeps_order_beyond_concurrency_limit() {
        let server = MockServer::start().await;
        let send_path = "/v1/projects/campus-connect-test/messages:send";

        // Earlier tokens answer slower so completion order is reversed
        for i in 0..5u64 {
            Mock::given(method("POST"))
                .and(path(send_path))
                .and(body_string_contains(format!(r#""token":"device-{}""#, i)))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({ "name": format!("msg-{}", i) }))
                        .set_delay(Duration::from_millis(50 * (5 - i))),
                )
                .expect(1)
                .mount(&server)
                .await;
        }

        let dispatcher = FcmHttpV1Dispatcher::new(
            "campus-connect-test",
            Arc::new(StaticToken),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_url(server.uri())
        .with_multicast_concurrency(2);

        let tokens: Vec<String> = (0..5).map(|i| format!("device-{}", i)).collect();
        let request = NotificationRequest {
            title: Some("Lab moved".to_string()),
            body: Some("Room 204".to_string()),
            tokens: Some(tokens.clone()),
            ..Default::default()
        };
        let envelope = PayloadBuilder::new(PushDefaults::default())
            .build(&request)
            .unwrap();

        let result = dispatcher.dispatch(&envelope).await.unwrap();

        assert_eq!(result.success_count, Some(5));
        let sent: Vec<&str> = result.responses.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(sent, tokens);
        let ids: Vec<Option<&str>> = result
            .responses
            .iter()
            .map(|r| r.message_id.as_deref())
            .collect();
        assert_eq!(
            ids,
            vec![
                Some("msg-0"),
                Some("msg-1"),
                Some("msg-2"),
                Some("msg-3"),
                Some("msg-4")
            ]
        );
    }

    #[test]
    fn test_outcome_keeps_message_and_code() {
        let error = DeliveryError::Provider {
            status: 404,
            error: ProviderError {
                code: Some(404),
                message: "Requested entity was not found.".to_string(),
                status: Some("NOT_FOUND".to_string()),
                error_code: Some("UNREGISTERED".to_string()),
                details: Vec::new(),
            },
        };
        assert_eq!(outcome_message(&error), "Requested entity was not found.");
        assert_eq!(outcome_code(&error).as_deref(), Some("UNREGISTERED"));

        let error = DeliveryError::Http {
            status: 502,
            body: "Bad Gateway".to_string(),
        };
        assert_eq!(outcome_message(&error), "FCM API error 502: Bad Gateway");
        assert_eq!(outcome_code(&error), None);
    }
}
