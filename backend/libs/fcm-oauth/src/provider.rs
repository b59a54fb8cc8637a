use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::assertion::AssertionSigner;
use crate::client::TokenExchangeClient;
use crate::credential::ServiceAccountCredential;
use crate::errors::FcmAuthError;
use crate::models::AccessToken;

/// Cached tokens are dropped this long before they actually expire
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Source of bearer tokens for the FCM API
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Service account email the tokens are issued to
    fn identity(&self) -> &str;

    async fn access_token(&self) -> Result<AccessToken, FcmAuthError>;

    /// Forget any token held for reuse, e.g. after the API answered 401
    async fn invalidate(&self) {}
}

/// Mints a fresh assertion and exchanges it on every call
pub struct TokenMinter {
    signer: AssertionSigner,
    exchange: TokenExchangeClient,
}

impl TokenMinter {
    pub fn new(
        credential: &ServiceAccountCredential,
        exchange: TokenExchangeClient,
    ) -> Result<Self, FcmAuthError> {
        Ok(Self {
            signer: AssertionSigner::new(credential)?,
            exchange,
        })
    }
}

#[async_trait]
impl AccessTokenProvider for TokenMinter {
    fn identity(&self) -> &str {
        self.signer.issuer()
    }

    async fn access_token(&self) -> Result<AccessToken, FcmAuthError> {
        let assertion = self.signer.sign()?;
        self.exchange.exchange(&assertion).await
    }
}

struct CachedToken {
    identity: String,
    token: AccessToken,
}

/// Single-slot token cache in front of another provider
///
/// The slot is keyed by the provider identity and refreshed once the token
/// is within the refresh margin of expiring. The lock is held while
/// refreshing, so concurrent callers wait for one exchange instead of each
/// minting their own.
pub struct CachedTokenProvider<P> {
    inner: P,
    slot: Mutex<Option<CachedToken>>,
    margin: Duration,
}

impl<P: AccessTokenProvider> CachedTokenProvider<P> {
    pub fn new(inner: P) -> Self {
        Self::with_margin(inner, Duration::seconds(TOKEN_REFRESH_MARGIN_SECS))
    }

    pub fn with_margin(inner: P, margin: Duration) -> Self {
        Self {
            inner,
            slot: Mutex::new(None),
            margin,
        }
    }
}

#[async_trait]
impl<P: AccessTokenProvider> AccessTokenProvider for CachedTokenProvider<P> {
    fn identity(&self) -> &str {
        self.inner.identity()
    }

    async fn access_token(&self) -> Result<AccessToken, FcmAuthError> {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if cached.identity == self.inner.identity()
                && cached.token.is_fresh_at(Utc::now(), self.margin)
            {
                debug!(identity = %cached.identity, "Using cached access token");
                return Ok(cached.token.clone());
            }
        }

        let token = self.inner.access_token().await?;
        info!(
            identity = %self.inner.identity(),
            expires_at = %token.expires_at(),
            "Cached new access token"
        );
        *slot = Some(CachedToken {
            identity: self.inner.identity().to_string(),
            token: token.clone(),
        });

        Ok(token)
    }

    async fn invalidate(&self) {
        self.slot.lock().await.take();
        self.inner.invalidate().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        lifetime: Duration,
    }

    #[async_trait]
    impl AccessTokenProvider for CountingProvider {
        fn identity(&self) -> &str {
            "svc@example.iam"
        }

        async fn access_token(&self) -> Result<AccessToken, FcmAuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken::new(
                format!("token-{}", n),
                Utc::now() + self.lifetime,
            ))
        }
    }

    fn counting(lifetime: Duration) -> (CountingProvider, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            CountingProvider {
                calls: calls.clone(),
                lifetime,
            },
            calls,
        )
    }

    #[tokio::test]
    async fn test_cache_reuses_fresh_token() {
        let (inner, calls) = counting(Duration::seconds(3600));
        let provider = CachedTokenProvider::new(inner);

        let first = provider.access_token().await.unwrap();
        let second = provider.access_token().await.unwrap();

        assert_eq!(first.secret(), "token-0");
        assert_eq!(second.secret(), "token-0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_refreshes_within_margin() {
        // Expires inside the 60s margin, so it is never reused
        let (inner, calls) = counting(Duration::seconds(30));
        let provider = CachedTokenProvider::new(inner);

        provider.access_token().await.unwrap();
        let second = provider.access_token().await.unwrap();

        assert_eq!(second.secret(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_token() {
        let (inner, calls) = counting(Duration::seconds(3600));
        let provider = CachedTokenProvider::new(inner);

        provider.access_token().await.unwrap();
        provider.invalidate().await;
        let token = provider.access_token().await.unwrap();

        assert_eq!(token.secret(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.identity(), "svc@example.iam");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_exchange() {
        let (inner, calls) = counting(Duration::seconds(3600));
        let provider = Arc::new(CachedTokenProvider::new(inner));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.access_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().secret(), "token-0");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
