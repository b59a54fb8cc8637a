use std::fmt;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use tracing::debug;

use crate::credential::{ServiceAccountCredential, GOOGLE_TOKEN_URI};
use crate::encoding::{base64url_decode, pem_to_der};
use crate::errors::FcmAuthError;
use crate::models::{JwtClaims, ASSERTION_LIFETIME_SECS, FIREBASE_MESSAGING_SCOPE};

/// Signs RS256 bearer assertions for one service account
///
/// The private key is imported once, so minting an assertion only costs the
/// claim serialization and one RSA signature.
pub struct AssertionSigner {
    issuer: String,
    encoding_key: EncodingKey,
}

/// A signed `header.claims.signature` JWT
#[derive(Clone)]
pub struct JwtAssertion {
    claims: JwtClaims,
    token: String,
}

impl AssertionSigner {
    /// Import the credential's private key for signing.
    ///
    /// The PEM armor and whitespace are stripped, the base64 body decoded to
    /// DER and parsed as PKCS#8 (falling back to PKCS#1).
    pub fn new(credential: &ServiceAccountCredential) -> Result<Self, FcmAuthError> {
        let encoding_key = import_signing_key(&credential.private_key)?;

        debug!(
            issuer = %credential.client_email,
            key_id = ?credential.private_key_id,
            "Imported service account signing key"
        );

        Ok(Self {
            issuer: credential.client_email.clone(),
            encoding_key,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Mint an assertion issued now
    pub fn sign(&self) -> Result<JwtAssertion, FcmAuthError> {
        self.sign_at(Utc::now().timestamp())
    }

    /// Mint an assertion issued at `issued_at` (unix seconds)
    pub fn sign_at(&self, issued_at: i64) -> Result<JwtAssertion, FcmAuthError> {
        let claims = JwtClaims {
            iss: self.issuer.clone(),
            scope: FIREBASE_MESSAGING_SCOPE.to_string(),
            aud: GOOGLE_TOKEN_URI.to_string(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        };

        let token = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| FcmAuthError::Crypto(format!("failed to sign assertion: {}", e)))?;

        Ok(JwtAssertion { claims, token })
    }
}

impl JwtAssertion {
    pub fn claims(&self) -> &JwtClaims {
        &self.claims
    }

    /// Compact serialization sent as the `assertion` form field
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// `base64url(header) + "." + base64url(claims)`
    pub fn signing_input(&self) -> &str {
        match self.token.rfind('.') {
            Some(idx) => &self.token[..idx],
            None => &self.token,
        }
    }

    /// Raw RSASSA-PKCS1-v1_5 signature bytes
    pub fn signature(&self) -> Result<Vec<u8>, FcmAuthError> {
        let segment = self.token.rsplit('.').next().unwrap_or_default();
        base64url_decode(segment)
            .map_err(|e| FcmAuthError::Crypto(format!("malformed signature segment: {}", e)))
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        self.claims.is_valid_at(now)
    }
}

impl fmt::Debug for JwtAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtAssertion")
            .field("claims", &self.claims)
            .field("token", &"<redacted>")
            .finish()
    }
}

fn import_signing_key(private_key_pem: &str) -> Result<EncodingKey, FcmAuthError> {
    let der = pem_to_der(private_key_pem)?;

    let key = match RsaPrivateKey::from_pkcs8_der(&der) {
        Ok(key) => key,
        Err(pkcs8_err) => RsaPrivateKey::from_pkcs1_der(&der).map_err(|_| {
            FcmAuthError::Crypto(format!(
                "failed to parse service account private key: {}",
                pkcs8_err
            ))
        })?,
    };

    let pkcs1 = key
        .to_pkcs1_der()
        .map_err(|e| FcmAuthError::Crypto(format!("failed to encode private key: {}", e)))?;

    Ok(EncodingKey::from_rsa_der(pkcs1.as_bytes()))
}
