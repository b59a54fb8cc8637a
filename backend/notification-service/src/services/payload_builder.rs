/// Notification Payload Builder
///
/// Turns an inbound `NotificationRequest` into a validated
/// `NotificationEnvelope` with the platform defaults applied:
/// - Android: priority `high`, the configured channel, sound `default`,
///   default vibrate timings
/// - iOS: sound `default`, badge `1`
/// - Event notifications additionally get the launcher icon and
///   `content-available`
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::PushDefaults;
use crate::error::{AppError, Result};
use crate::models::{
    AndroidHints, EventData, IosHints, NotificationEnvelope, NotificationRequest, Target,
    MAX_MULTICAST_TOKENS,
};

const EVENT_NOTIFICATION_TYPE: &str = "new_event";
const BROADCAST_NOTIFICATION_TYPE: &str = "announcement";
const DIRECT_NOTIFICATION_TYPE: &str = "notification";

pub struct PayloadBuilder {
    defaults: PushDefaults,
}

impl PayloadBuilder {
    pub fn new(defaults: PushDefaults) -> Self {
        Self { defaults }
    }

    pub fn build(&self, request: &NotificationRequest) -> Result<NotificationEnvelope> {
        self.build_at(request, Utc::now())
    }

    /// Build with an explicit clock, used for the `timestamp` data field
    pub fn build_at(
        &self,
        request: &NotificationRequest,
        now: DateTime<Utc>,
    ) -> Result<NotificationEnvelope> {
        let title = non_blank(request.title.as_deref());
        let body = non_blank(request.body.as_deref());
        let (title, body) = match (title, body) {
            (Some(title), Some(body)) => (title, body),
            _ => {
                return Err(AppError::Validation(
                    "Title and body are required".to_string(),
                ))
            }
        };

        let event = request.event_data.as_ref();
        let target = self.resolve_target(request)?;
        let data = self.data_fields(request, event, &target, now);

        let android = AndroidHints {
            priority: "high".to_string(),
            channel_id: self.defaults.android_channel_id.clone(),
            sound: "default".to_string(),
            default_vibrate_timings: true,
            icon: event.map(|_| self.defaults.android_icon.clone()),
        };
        let apns = IosHints {
            sound: "default".to_string(),
            badge: 1,
            content_available: event.is_some(),
        };

        Ok(NotificationEnvelope::new(
            title.to_string(),
            body.to_string(),
            data,
            target,
            android,
            apns,
        ))
    }

    fn resolve_target(&self, request: &NotificationRequest) -> Result<Target> {
        let selectors = [
            request.topic.is_some(),
            request.token.is_some(),
            request.tokens.is_some(),
        ]
        .iter()
        .filter(|given| **given)
        .count();
        if selectors > 1 {
            return Err(AppError::Validation(
                "Only one of topic, token or tokens may be given".to_string(),
            ));
        }

        if let Some(topic) = request.topic.as_deref() {
            return normalize_topic(topic).map(Target::Topic);
        }

        if let Some(token) = request.token.as_deref() {
            let token = non_blank(Some(token))
                .ok_or_else(|| AppError::Validation("Device token must not be blank".to_string()))?;
            return Ok(Target::Token(token.to_string()));
        }

        if let Some(tokens) = request.tokens.as_ref() {
            if tokens.is_empty() {
                return Err(AppError::Validation(
                    "Tokens must contain at least one device token".to_string(),
                ));
            }
            if tokens.len() > MAX_MULTICAST_TOKENS {
                return Err(AppError::Validation(format!(
                    "At most {} tokens may be sent in one multicast, got {}",
                    MAX_MULTICAST_TOKENS,
                    tokens.len()
                )));
            }
            if tokens.iter().any(|t| t.trim().is_empty()) {
                return Err(AppError::Validation(
                    "Device tokens must not be blank".to_string(),
                ));
            }
            return Ok(Target::Tokens(
                tokens.iter().map(|t| t.trim().to_string()).collect(),
            ));
        }

        let default_topic = if request.event_data.is_some() {
            &self.defaults.event_topic
        } else {
            &self.defaults.broadcast_topic
        };
        Ok(Target::Topic(default_topic.clone()))
    }

    fn data_fields(
        &self,
        request: &NotificationRequest,
        event: Option<&EventData>,
        target: &Target,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();

        let notification_type = match event {
            Some(_) => EVENT_NOTIFICATION_TYPE.to_string(),
            None => non_blank(request.notification_type.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| match target {
                    Target::Topic(_) => BROADCAST_NOTIFICATION_TYPE.to_string(),
                    Target::Token(_) | Target::Tokens(_) => DIRECT_NOTIFICATION_TYPE.to_string(),
                }),
        };
        data.insert("type".to_string(), notification_type);

        if let Some(event) = event {
            let fields = [
                ("event_id", &event.event_id),
                ("event_title", &event.event_title),
                ("event_time", &event.event_time),
                ("event_location", &event.event_location),
            ];
            for (key, value) in fields {
                data.insert(key.to_string(), value.clone().unwrap_or_default());
            }
        }

        if matches!(target, Target::Topic(_)) {
            data.insert("click_action".to_string(), self.defaults.click_action.clone());
        }

        data.insert(
            "timestamp".to_string(),
            now.timestamp_millis().to_string(),
        );
        data
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Strip a leading `/topics/` and check the FCM topic charset
fn normalize_topic(raw: &str) -> Result<String> {
    let topic = raw.trim();
    let topic = topic.strip_prefix("/topics/").unwrap_or(topic);

    let valid = !topic.is_empty()
        && topic
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '%'));
    if !valid {
        return Err(AppError::Validation(format!("Invalid topic name: {:?}", raw)));
    }

    Ok(topic.to_string())
}
