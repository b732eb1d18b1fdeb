//! Session keys and their process-local cache.
//!
//! A session key is a short-lived signed credential that authorizes
//! decryption requests without re-signing per request. The cache issues
//! lazily, never serves a key past its TTL, and on an expiry-triggered
//! decrypt failure performs exactly one transparent re-issue. A second
//! expiry within the same call is fatal, not retried again.

use super::gateway::{CapabilityRef, EncryptionGateway, GatewayError, GatewayResult};
use crate::ledger::TxSigner;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Short-lived signed decryption credential for one requester identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    /// Requester identity (ledger address).
    pub identity: String,
    pub issued_at_ms: i64,
    pub ttl_ms: i64,
    /// Signed proof from the requester's key.
    pub proof: Vec<u8>,
}

impl SessionKey {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.issued_at_ms + self.ttl_ms
    }
}

/// Issues fresh session keys; requires a caller-supplied signing callback.
#[async_trait]
pub trait SessionKeyIssuer: Send + Sync {
    async fn issue(&self, identity: &str, signer: &dyn TxSigner) -> GatewayResult<SessionKey>;
}

/// Issuer whose proof is the requester's signature over an issuance intent.
pub struct SigningIssuer {
    ttl_ms: i64,
}

impl SigningIssuer {
    pub fn new(ttl_ms: i64) -> Self {
        Self { ttl_ms }
    }
}

#[async_trait]
impl SessionKeyIssuer for SigningIssuer {
    async fn issue(&self, identity: &str, signer: &dyn TxSigner) -> GatewayResult<SessionKey> {
        let issued_at_ms = now_ms();
        let intent = format!("session-key:{identity}:{issued_at_ms}:{}", self.ttl_ms);
        let proof = signer
            .sign(intent.as_bytes())
            .await
            .map_err(|e| GatewayError::IssuanceFailed(e.to_string()))?;
        Ok(SessionKey {
            identity: identity.to_string(),
            issued_at_ms,
            ttl_ms: self.ttl_ms,
            proof,
        })
    }
}

/// Process-local cache of session keys keyed by requester identity.
#[derive(Clone)]
pub struct SessionKeyCache {
    issuer: Arc<dyn SessionKeyIssuer>,
    keys: Arc<RwLock<HashMap<String, SessionKey>>>,
}

impl SessionKeyCache {
    pub fn new(issuer: Arc<dyn SessionKeyIssuer>) -> Self {
        Self {
            issuer,
            keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cached live key, or a lazily issued fresh one. A cached key past its
    /// TTL is never returned.
    pub async fn get(&self, identity: &str, signer: &dyn TxSigner) -> GatewayResult<SessionKey> {
        {
            let keys = self.keys.read().unwrap();
            if let Some(key) = keys.get(identity) {
                if !key.is_expired(now_ms()) {
                    return Ok(key.clone());
                }
            }
        }

        debug!(identity, "issuing session key");
        let key = self.issuer.issue(identity, signer).await?;
        self.keys
            .write()
            .unwrap()
            .insert(identity.to_string(), key.clone());
        Ok(key)
    }

    /// Drop a cached key early (on an expiry-triggered decrypt failure).
    pub fn invalidate(&self, identity: &str) {
        self.keys.write().unwrap().remove(identity);
    }

    /// Decrypt with at most one transparent re-issue: if the gateway
    /// reports [`GatewayError::ExpiredSessionKey`], invalidate, issue a
    /// fresh key, and retry once. A second expiry surfaces as-is.
    pub async fn decrypt_with_retry(
        &self,
        gateway: &dyn EncryptionGateway,
        ciphertext: &[u8],
        identity: &str,
        capability: &CapabilityRef,
        signer: &dyn TxSigner,
    ) -> GatewayResult<Vec<u8>> {
        let key = self.get(identity, signer).await?;
        match gateway.decrypt(ciphertext, &key, capability).await {
            Err(GatewayError::ExpiredSessionKey) => {
                debug!(identity, "session key expired, re-issuing once");
                self.invalidate(identity);
                let fresh = self.get(identity, signer).await?;
                gateway.decrypt(ciphertext, &fresh, capability).await
            }
            other => other,
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockSigner;
    use std::sync::Mutex;

    /// Issuer that counts issuances and hands out fixed-TTL keys.
    struct CountingIssuer {
        issued: Mutex<u64>,
        ttl_ms: i64,
    }

    impl CountingIssuer {
        fn new(ttl_ms: i64) -> Self {
            Self {
                issued: Mutex::new(0),
                ttl_ms,
            }
        }
    }

    #[async_trait]
    impl SessionKeyIssuer for CountingIssuer {
        async fn issue(&self, identity: &str, _signer: &dyn TxSigner) -> GatewayResult<SessionKey> {
            *self.issued.lock().unwrap() += 1;
            Ok(SessionKey {
                identity: identity.to_string(),
                issued_at_ms: now_ms(),
                ttl_ms: self.ttl_ms,
                proof: vec![0xAB],
            })
        }
    }

    /// Gateway scripted to fail the first N decrypts with ExpiredSessionKey.
    struct ExpiringGateway {
        expiries_left: Mutex<u32>,
    }

    #[async_trait]
    impl EncryptionGateway for ExpiringGateway {
        async fn encrypt(&self, _identity: &str, plaintext: &[u8]) -> GatewayResult<Vec<u8>> {
            Ok(plaintext.to_vec())
        }

        async fn decrypt(
            &self,
            ciphertext: &[u8],
            _session_key: &SessionKey,
            _capability: &CapabilityRef,
        ) -> GatewayResult<Vec<u8>> {
            let mut left = self.expiries_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(GatewayError::ExpiredSessionKey);
            }
            Ok(ciphertext.to_vec())
        }
    }

    fn capability() -> CapabilityRef {
        CapabilityRef {
            grant_id: "A1".to_string(),
            profile_id: "P1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_cached_key_is_reused() {
        let issuer = Arc::new(CountingIssuer::new(60_000));
        let cache = SessionKeyCache::new(issuer.clone());
        let signer = MockSigner::new("addr1");

        let k1 = cache.get("addr1", &signer).await.unwrap();
        let k2 = cache.get("addr1", &signer).await.unwrap();
        assert_eq!(k1, k2);
        assert_eq!(*issuer.issued.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_cached_key_reissued() {
        let issuer = Arc::new(CountingIssuer::new(0));
        let cache = SessionKeyCache::new(issuer.clone());
        let signer = MockSigner::new("addr1");

        cache.get("addr1", &signer).await.unwrap();
        // TTL 0: the cached key is already expired, so a new one is issued.
        cache.get("addr1", &signer).await.unwrap();
        assert_eq!(*issuer.issued.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_single_retry_on_expiry() {
        let issuer = Arc::new(CountingIssuer::new(60_000));
        let cache = SessionKeyCache::new(issuer.clone());
        let signer = MockSigner::new("addr1");
        let gateway = ExpiringGateway {
            expiries_left: Mutex::new(1),
        };

        let plaintext = cache
            .decrypt_with_retry(&gateway, b"data", "addr1", &capability(), &signer)
            .await
            .unwrap();
        assert_eq!(plaintext, b"data");
        // Initial issue + one re-issue after the expiry failure.
        assert_eq!(*issuer.issued.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_second_expiry_is_fatal() {
        let issuer = Arc::new(CountingIssuer::new(60_000));
        let cache = SessionKeyCache::new(issuer.clone());
        let signer = MockSigner::new("addr1");
        let gateway = ExpiringGateway {
            expiries_left: Mutex::new(2),
        };

        let err = cache
            .decrypt_with_retry(&gateway, b"data", "addr1", &capability(), &signer)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::ExpiredSessionKey);
        // Exactly one re-issue was attempted, never a third.
        assert_eq!(*issuer.issued.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_denied_is_not_retried() {
        struct DenyingGateway;

        #[async_trait]
        impl EncryptionGateway for DenyingGateway {
            async fn encrypt(&self, _i: &str, p: &[u8]) -> GatewayResult<Vec<u8>> {
                Ok(p.to_vec())
            }
            async fn decrypt(
                &self,
                _c: &[u8],
                _s: &SessionKey,
                _cap: &CapabilityRef,
            ) -> GatewayResult<Vec<u8>> {
                Err(GatewayError::DecryptionDenied)
            }
        }

        let issuer = Arc::new(CountingIssuer::new(60_000));
        let cache = SessionKeyCache::new(issuer.clone());
        let signer = MockSigner::new("addr1");

        let err = cache
            .decrypt_with_retry(&DenyingGateway, b"data", "addr1", &capability(), &signer)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::DecryptionDenied);
        assert_eq!(*issuer.issued.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_signing_issuer_uses_caller_signature() {
        let issuer = SigningIssuer::new(30_000);
        let signer = MockSigner::new("addr1");
        let key = issuer.issue("addr1", &signer).await.unwrap();
        assert_eq!(key.identity, "addr1");
        assert_eq!(key.ttl_ms, 30_000);
        assert!(!key.proof.is_empty());
        assert_eq!(signer.signature_count(), 1);
    }
}
