/// FCM OAuth Library
///
/// Mints OAuth2 access tokens for the Firebase Cloud Messaging HTTP v1 API
/// from a Google service account, without an external auth client.
///
/// It handles:
/// - Parsing the service account credential JSON
/// - Building RS256-signed JWT bearer assertions
/// - Exchanging assertions at the Google token endpoint (JWT-bearer grant)
/// - Optional single-slot token caching with early refresh

pub mod assertion;
pub mod client;
pub mod credential;
pub mod encoding;
pub mod errors;
pub mod models;
pub mod provider;

pub use assertion::{AssertionSigner, JwtAssertion};
pub use client::{TokenExchangeClient, DEFAULT_EXCHANGE_TIMEOUT};
pub use credential::{ServiceAccountCredential, GOOGLE_TOKEN_URI};
pub use errors::{AuthExchangeError, FcmAuthError};
pub use models::{AccessToken, JwtClaims, FIREBASE_MESSAGING_SCOPE};
pub use provider::{AccessTokenProvider, CachedTokenProvider, TokenMinter};
