/// Notification Service
///
/// Request boundary of the dispatch pipeline:
/// 1. Validates the request and builds the envelope
/// 2. Mints an access token and sends through the configured `Dispatcher`
/// 3. Converts every outcome, including errors, into a `DispatchResponse`
use std::sync::Arc;

use fcm_oauth::{AccessTokenProvider, CachedTokenProvider, TokenExchangeClient, TokenMinter};
use tracing::{error, info, warn};

use super::dispatcher::Dispatcher;
use super::fcm_client::FcmHttpV1Dispatcher;
use super::payload_builder::PayloadBuilder;
use crate::config::{Config, PushDefaults};
use crate::error::{AppError, Result};
use crate::models::{DispatchResponse, DispatchResult, NotificationRequest};

pub struct NotificationService {
    builder: PayloadBuilder,
    dispatcher: Arc<dyn Dispatcher>,
}

impl NotificationService {
    pub fn new(defaults: PushDefaults, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            builder: PayloadBuilder::new(defaults),
            dispatcher,
        }
    }

    /// Wire credential, token provider and HTTP v1 dispatcher from configuration
    ///
    /// Fails when the credential is missing or its key cannot be imported.
    pub fn from_config(config: &Config) -> Result<Self> {
        let credential = config.credential()?;
        let project_id = config.project_id(&credential)?;
        let timeout = config.fcm.request_timeout();

        let exchange =
            TokenExchangeClient::new(timeout)?.with_endpoint(config.fcm.token_uri.clone());
        let minter = TokenMinter::new(&credential, exchange)?;
        let tokens: Arc<dyn AccessTokenProvider> = if config.fcm.token_cache {
            Arc::new(CachedTokenProvider::new(minter))
        } else {
            Arc::new(minter)
        };

        let dispatcher = FcmHttpV1Dispatcher::new(project_id.clone(), tokens, timeout)?
            .with_base_url(config.fcm.api_base_url.clone())
            .with_validate_only(config.fcm.validate_only);

        info!(
            project_id = %project_id,
            issuer = %credential.client_email,
            key_id = ?credential.private_key_id,
            token_cache = config.fcm.token_cache,
            validate_only = config.fcm.validate_only,
            "Notification service configured"
        );

        Ok(Self::new(config.push.clone(), Arc::new(dispatcher)))
    }

    /// Validate, build and dispatch one request
    pub async fn send(&self, request: &NotificationRequest) -> Result<DispatchResult> {
        let envelope = self.builder.build(request)?;
        info!(
            title = %envelope.title(),
            target = envelope.target().kind(),
            "Dispatching notification"
        );
        self.dispatcher.dispatch(&envelope).await
    }

    /// Dispatch and convert the outcome into the caller-facing response
    pub async fn handle(&self, request: NotificationRequest) -> DispatchResponse {
        match self.send(&request).await {
            Ok(result) => {
                DispatchResponse::from_result(&result, success_message(&request, &result))
            }
            Err(e) => {
                match &e {
                    AppError::Validation(_) => warn!(error = %e, "Rejected notification request"),
                    _ => error!(
                        kind = e.kind().as_str(),
                        retryable = e.is_retryable(),
                        error = %e,
                        "Failed to send notification"
                    ),
                }
                DispatchResponse::failure(e.user_message())
            }
        }
    }

    /// Parse a JSON request body and handle it
    pub async fn handle_json(&self, body: &str) -> DispatchResponse {
        match serde_json::from_str::<NotificationRequest>(body) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                let e = AppError::Validation(format!("Invalid request body: {}", e));
                warn!(error = %e, "Rejected notification request");
                DispatchResponse::failure(e.user_message())
            }
        }
    }
}

fn success_message(request: &NotificationRequest, result: &DispatchResult) -> String {
    if request.tokens.is_some() {
        let success = result.success_count.unwrap_or(0);
        let total = success + result.failure_count.unwrap_or(0);
        format!("Sent to {} of {} devices", success, total)
    } else if request.event_data.is_some() {
        "Event notification sent successfully".to_string()
    } else {
        "Notification sent successfully".to_string()
    }
}
