use std::fmt;
use std::time::Duration;

use fcm_oauth::{ServiceAccountCredential, GOOGLE_TOKEN_URI};
use serde::Deserialize;

use crate::error::{AppError, Result};

/// Environment variable holding the full service account JSON
pub const SERVICE_ACCOUNT_ENV: &str = "FIREBASE_SERVICE_ACCOUNT";

#[derive(Clone)]
pub struct Config {
    pub fcm: FcmSettings,
    pub push: PushDefaults,
    service_account_json: Option<String>,
}

/// `FCM_*` settings
#[derive(Debug, Clone, Deserialize)]
pub struct FcmSettings {
    /// Delivery project; falls back to the credential's `project_id`
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    /// Bound on each token exchange and each send (default: 30)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Reuse access tokens until shortly before expiry instead of minting per send
    #[serde(default)]
    pub token_cache: bool,
    /// Ask FCM to validate messages without delivering them
    #[serde(default)]
    pub validate_only: bool,
}

/// `PUSH_*` platform and routing defaults
#[derive(Debug, Clone, Deserialize)]
pub struct PushDefaults {
    #[serde(default = "default_broadcast_topic")]
    pub broadcast_topic: String,
    #[serde(default = "default_event_topic")]
    pub event_topic: String,
    #[serde(default = "default_android_channel_id")]
    pub android_channel_id: String,
    #[serde(default = "default_android_icon")]
    pub android_icon: String,
    #[serde(default = "default_click_action")]
    pub click_action: String,
}

fn default_api_base_url() -> String {
    "https://fcm.googleapis.com".to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_broadcast_topic() -> String {
    "all_users".to_string()
}

fn default_event_topic() -> String {
    "all_events".to_string()
}

fn default_android_channel_id() -> String {
    "campus_connect_channel".to_string()
}

fn default_android_icon() -> String {
    "@mipmap/ic_launcher".to_string()
}

fn default_click_action() -> String {
    "FLUTTER_NOTIFICATION_CLICK".to_string()
}

impl Default for PushDefaults {
    fn default() -> Self {
        Self {
            broadcast_topic: default_broadcast_topic(),
            event_topic: default_event_topic(),
            android_channel_id: default_android_channel_id(),
            android_icon: default_android_icon(),
            click_action: default_click_action(),
        }
    }
}

impl Default for FcmSettings {
    fn default() -> Self {
        Self {
            project_id: None,
            api_base_url: default_api_base_url(),
            token_uri: default_token_uri(),
            request_timeout_secs: default_request_timeout_secs(),
            token_cache: false,
            validate_only: false,
        }
    }
}

impl FcmSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the process environment (and `.env`, if present)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from explicit `(name, value)` pairs
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();

        let fcm: FcmSettings = envy::prefixed("FCM_")
            .from_iter(vars.iter().cloned())
            .map_err(|e| AppError::Configuration(format!("invalid FCM_* settings: {}", e)))?;
        let push: PushDefaults = envy::prefixed("PUSH_")
            .from_iter(vars.iter().cloned())
            .map_err(|e| AppError::Configuration(format!("invalid PUSH_* settings: {}", e)))?;

        if fcm.request_timeout_secs == 0 {
            return Err(AppError::Configuration(
                "FCM_REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        let service_account_json = vars
            .into_iter()
            .find(|(name, _)| name == SERVICE_ACCOUNT_ENV)
            .map(|(_, value)| value);

        Ok(Self {
            fcm,
            push,
            service_account_json,
        })
    }

    /// Build a configuration around an in-memory credential blob
    pub fn with_service_account(
        fcm: FcmSettings,
        push: PushDefaults,
        service_account_json: impl Into<String>,
    ) -> Self {
        Self {
            fcm,
            push,
            service_account_json: Some(service_account_json.into()),
        }
    }

    /// Parse the service account credential. Fatal at startup when invalid.
    pub fn credential(&self) -> Result<ServiceAccountCredential> {
        ServiceAccountCredential::from_secret(self.service_account_json.as_deref()).map_err(|e| {
            AppError::Configuration(format!("{} is not usable: {}", SERVICE_ACCOUNT_ENV, e))
        })
    }

    /// Delivery project id: `FCM_PROJECT_ID`, else the credential's project
    pub fn project_id(&self, credential: &ServiceAccountCredential) -> Result<String> {
        self.fcm
            .project_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| credential.project_id.clone())
            .ok_or_else(|| {
                AppError::Configuration(
                    "FCM_PROJECT_ID is not set and the service account has no project_id"
                        .to_string(),
                )
            })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("fcm", &self.fcm)
            .field("push", &self.push)
            .field(
                "service_account_json",
                &self.service_account_json.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(vars(&[])).unwrap();

        assert_eq!(config.fcm.api_base_url, "https://fcm.googleapis.com");
        assert_eq!(config.fcm.token_uri, "https://oauth2.googleapis.com/token");
        assert_eq!(config.fcm.request_timeout(), Duration::from_secs(30));
        assert!(!config.fcm.token_cache);
        assert!(!config.fcm.validate_only);
        assert_eq!(config.push.broadcast_topic, "all_users");
        assert_eq!(config.push.event_topic, "all_events");
        assert_eq!(config.push.android_channel_id, "campus_connect_channel");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(vars(&[
            ("FCM_PROJECT_ID", "campus-connect-23fae"),
            ("FCM_REQUEST_TIMEOUT_SECS", "5"),
            ("FCM_TOKEN_CACHE", "true"),
            ("PUSH_BROADCAST_TOPIC", "everyone"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.fcm.project_id.as_deref(), Some("campus-connect-23fae"));
        assert_eq!(config.fcm.request_timeout(), Duration::from_secs(5));
        assert!(config.fcm.token_cache);
        assert_eq!(config.push.broadcast_topic, "everyone");
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        assert!(matches!(
            Config::from_vars(vars(&[("FCM_REQUEST_TIMEOUT_SECS", "soon")])),
            Err(AppError::Configuration(_))
        ));
        assert!(matches!(
            Config::from_vars(vars(&[("FCM_REQUEST_TIMEOUT_SECS", "0")])),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_credential_is_fatal() {
        let config = Config::from_vars(vars(&[])).unwrap();
        assert!(matches!(config.credential(), Err(AppError::Configuration(_))));

        let config = Config::from_vars(vars(&[(SERVICE_ACCOUNT_ENV, "{}")])).unwrap();
        assert!(matches!(config.credential(), Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_project_id_fallback() {
        let credential = ServiceAccountCredential {
            client_email: "svc@example.iam".to_string(),
            private_key: "unused".to_string(),
            private_key_id: None,
            project_id: Some("from-credential".to_string()),
        };

        let config = Config::from_vars(vars(&[])).unwrap();
        assert_eq!(config.project_id(&credential).unwrap(), "from-credential");

        let config = Config::from_vars(vars(&[("FCM_PROJECT_ID", "explicit")])).unwrap();
        assert_eq!(config.project_id(&credential).unwrap(), "explicit");

        let anonymous = ServiceAccountCredential {
            project_id: None,
            ..credential
        };
        let config = Config::from_vars(vars(&[])).unwrap();
        assert!(matches!(
            config.project_id(&anonymous),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_redacts_credential() {
        let config = Config::with_service_account(
            FcmSettings::default(),
            PushDefaults::default(),
            r#"{"private_key":"secret-material"}"#,
        );
        assert!(!format!("{:?}", config).contains("secret-material"));
    }
}
