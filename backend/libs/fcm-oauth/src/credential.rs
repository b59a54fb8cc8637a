use std::fmt;

use serde::Deserialize;

use crate::errors::FcmAuthError;

/// Google OAuth2 token endpoint, also the `aud` claim of every assertion
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Parsed Firebase service account credential
///
/// Loaded once at startup from a secret and shared read-only afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceAccountCredential {
    pub client_email: String,
    pub private_key: String,
    pub private_key_id: Option<String>,
    pub project_id: Option<String>,
}

/// Raw JSON shape of a service account key file. Unknown fields
/// (`client_id`, `auth_uri`, ...) are ignored.
#[derive(Deserialize)]
struct RawServiceAccount {
    client_email: Option<String>,
    private_key: Option<String>,
    private_key_id: Option<String>,
    project_id: Option<String>,
}

impl ServiceAccountCredential {
    /// Parse a service account credential from its JSON blob
    pub fn from_json(blob: &str) -> Result<Self, FcmAuthError> {
        if blob.trim().is_empty() {
            return Err(FcmAuthError::Configuration(
                "service account credential is empty".to_string(),
            ));
        }

        let raw: RawServiceAccount = serde_json::from_str(blob).map_err(|e| {
            FcmAuthError::Configuration(format!("invalid service account JSON: {}", e))
        })?;

        let client_email = required(raw.client_email, "client_email")?;
        let private_key = required(raw.private_key, "private_key")?;

        Ok(Self {
            client_email,
            private_key,
            private_key_id: non_blank(raw.private_key_id),
            project_id: non_blank(raw.project_id),
        })
    }

    /// Parse an optional secret value, treating absence as a configuration error
    pub fn from_secret(secret: Option<&str>) -> Result<Self, FcmAuthError> {
        match secret {
            Some(blob) => Self::from_json(blob),
            None => Err(FcmAuthError::Configuration(
                "service account credential is not set".to_string(),
            )),
        }
    }

    /// Fixed OAuth token endpoint this credential authenticates against
    pub fn token_uri(&self) -> &'static str {
        GOOGLE_TOKEN_URI
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, FcmAuthError> {
    non_blank(value).ok_or_else(|| {
        FcmAuthError::Configuration(format!("service account is missing `{}`", field))
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("project_id", &self.project_id)
            .finish()
    }
}
