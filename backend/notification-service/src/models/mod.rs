use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// FCM accepts at most this many tokens in one multicast
pub const MAX_MULTICAST_TOKENS: usize = 500;

/// Inbound dispatch request
///
/// `body` is also accepted under the legacy name `message`. At most one of
/// `topic`, `token` and `tokens` may be given; with none, the message is a
/// broadcast to the default topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "message")]
    pub body: Option<String>,
    #[serde(default, rename = "type")]
    pub notification_type: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub tokens: Option<Vec<String>>,
    #[serde(default)]
    pub event_data: Option<EventData>,
}

/// Campus event attached to an event notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event_title: Option<String>,
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default)]
    pub event_location: Option<String>,
}

/// Where a notification is delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Topic(String),
    Token(String),
    Tokens(Vec<String>),
}

impl Target {
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Topic(_) => "topic",
            Target::Token(_) => "token",
            Target::Tokens(_) => "multicast",
        }
    }
}

/// Android delivery hints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidHints {
    pub priority: String,
    pub channel_id: String,
    pub sound: String,
    pub default_vibrate_timings: bool,
    pub icon: Option<String>,
}

/// iOS (APNs) delivery hints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IosHints {
    pub sound: String,
    pub badge: u32,
    pub content_available: bool,
}

/// A validated, platform-aware notification ready to dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEnvelope {
    title: String,
    body: String,
    data: BTreeMap<String, String>,
    target: Target,
    android: AndroidHints,
    apns: IosHints,
}

impl NotificationEnvelope {
    pub(crate) fn new(
        title: String,
        body: String,
        data: BTreeMap<String, String>,
        target: Target,
        android: AndroidHints,
        apns: IosHints,
    ) -> Self {
        Self {
            title,
            body,
            data,
            target,
            android,
            apns,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn android(&self) -> &AndroidHints {
        &self.android
    }

    pub fn apns(&self) -> &IosHints {
        &self.apns
    }
}

/// Single-recipient selector of one v1 send
#[derive(Debug, Clone, Copy)]
pub enum Destination<'a> {
    Topic(&'a str),
    Token(&'a str),
}

/// FCM v1 `messages:send` request body
#[derive(Debug, Serialize)]
pub struct FcmMessage {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub validate_only: bool,
    pub message: FcmMessageContent,
}

/// FCM Message Content
#[derive(Debug, Serialize)]
pub struct FcmMessageContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub notification: FcmNotification,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    pub android: FcmAndroidConfig,
    pub apns: FcmApnsConfig,
}

/// FCM Notification Payload
#[derive(Debug, Serialize)]
pub struct FcmNotification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct FcmAndroidConfig {
    pub priority: String,
    pub notification: FcmAndroidNotification,
}

#[derive(Debug, Serialize)]
pub struct FcmAndroidNotification {
    pub channel_id: String,
    pub sound: String,
    pub default_vibrate_timings: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FcmApnsConfig {
    pub payload: FcmApnsPayload,
}

#[derive(Debug, Serialize)]
pub struct FcmApnsPayload {
    pub aps: FcmAps,
}

#[derive(Debug, Serialize)]
pub struct FcmAps {
    pub sound: String,
    pub badge: u32,
    #[serde(rename = "content-available", skip_serializing_if = "Option::is_none")]
    pub content_available: Option<u8>,
}

impl FcmMessage {
    pub fn new(
        envelope: &NotificationEnvelope,
        destination: Destination<'_>,
        validate_only: bool,
    ) -> Self {
        let (topic, token) = match destination {
            Destination::Topic(topic) => (Some(topic.to_string()), None),
            Destination::Token(token) => (None, Some(token.to_string())),
        };
        let android = envelope.android();
        let apns = envelope.apns();

        Self {
            validate_only,
            message: FcmMessageContent {
                topic,
                token,
                notification: FcmNotification {
                    title: envelope.title().to_string(),
                    body: envelope.body().to_string(),
                },
                data: envelope.data().clone(),
                android: FcmAndroidConfig {
                    priority: android.priority.clone(),
                    notification: FcmAndroidNotification {
                        channel_id: android.channel_id.clone(),
                        sound: android.sound.clone(),
                        default_vibrate_timings: android.default_vibrate_timings,
                        icon: android.icon.clone(),
                    },
                },
                apns: FcmApnsConfig {
                    payload: FcmApnsPayload {
                        aps: FcmAps {
                            sound: apns.sound.clone(),
                            badge: apns.badge,
                            content_available: apns.content_available.then_some(1),
                        },
                    },
                },
            },
        }
    }
}

/// FCM API Response
#[derive(Debug, Deserialize)]
pub struct FcmApiResponse {
    pub name: Option<String>,
}

/// FCM v1 error body `{"error": {...}}`
#[derive(Debug, Deserialize)]
pub struct FcmErrorEnvelope {
    pub error: ProviderError,
}

/// Structured error returned by the FCM API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
    /// FCM-specific code such as `UNREGISTERED`, lifted from `details`
    #[serde(skip)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub details: Vec<ProviderErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderErrorDetail {
    #[serde(rename = "@type", default)]
    pub type_url: Option<String>,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
}

impl ProviderError {
    /// Parse an FCM error body; `None` when it is not the v1 error shape
    pub fn from_body(body: &str) -> Option<Self> {
        let envelope: FcmErrorEnvelope = serde_json::from_str(body).ok()?;
        let mut error = envelope.error;
        error.error_code = error.details.iter().find_map(|d| d.error_code.clone());
        Some(error)
    }
}

/// Outcome of one token within a multicast
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub token: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Provider message, or the transport failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// FCM error code such as `UNREGISTERED`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Result of dispatching one envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub success_count: Option<usize>,
    pub failure_count: Option<usize>,
    pub responses: Vec<SendOutcome>,
}

impl DispatchResult {
    /// Topic or single-token send accepted by FCM
    pub fn single(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            success_count: Some(1),
            failure_count: None,
            responses: Vec::new(),
        }
    }

    /// Aggregate per-token outcomes; succeeds when any token was accepted
    pub fn multicast(responses: Vec<SendOutcome>) -> Self {
        let success_count = responses.iter().filter(|r| r.success).count();
        let failure_count = responses.len() - success_count;

        Self {
            success: success_count > 0,
            message_id: None,
            success_count: Some(success_count),
            failure_count: Some(failure_count),
            responses,
        }
    }

    /// Distinct per-token failure messages of a multicast that delivered nothing
    pub fn failure_summary(&self) -> Option<String> {
        if self.success {
            return None;
        }

        let mut messages: Vec<&str> = Vec::new();
        for error in self.responses.iter().filter_map(|r| r.error.as_deref()) {
            if !messages.contains(&error) {
                messages.push(error);
            }
        }

        if messages.is_empty() {
            None
        } else {
            Some(messages.join("; "))
        }
    }
}

/// Caller-facing response of `NotificationService::handle`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResponse {
    pub fn from_result(result: &DispatchResult, message: impl Into<String>) -> Self {
        Self {
            success: result.success,
            message: Some(message.into()),
            message_id: result.message_id.clone(),
            success_count: result.success_count,
            failure_count: result.failure_count,
            error: result.failure_summary(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            message_id: None,
            success_count: None,
            failure_count: None,
            error: Some(error.into()),
        }
    }
}
