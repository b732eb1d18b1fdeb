//! Identity-based encryption gateway.
//!
//! The encryption identity is the owning profile's id: every content item
//! under one profile shares one identity, so any valid capability for that
//! profile decrypts all of that profile's content.
//!
//! [`GatewayError::ExpiredSessionKey`] and
//! [`GatewayError::DecryptionDenied`] are distinct so callers can tell
//! "refresh the session key and retry" from "not authorized".

use super::session::SessionKey;
use async_trait::async_trait;
use hkdf::Hkdf;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use zeroize::Zeroizing;

/// GCM nonce length prefixed onto every ciphertext envelope.
const NONCE_LEN: usize = 12;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Encryption gateway errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The session key is past its TTL. Refresh and retry.
    #[error("session key expired")]
    ExpiredSessionKey,

    /// The capability is missing, revoked, or for the wrong profile. Not
    /// retryable.
    #[error("decryption denied")]
    DecryptionDenied,

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("session key issuance failed: {0}")]
    IssuanceFailed(String),
}

/// Caller-held proof authorizing decryption: an access grant bound to a
/// profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRef {
    pub grant_id: String,
    pub profile_id: String,
}

/// Trait abstraction for the encryption network.
#[async_trait]
pub trait EncryptionGateway: Send + Sync {
    /// Encrypt under the given identity (the owning profile id).
    async fn encrypt(&self, identity: &str, plaintext: &[u8]) -> GatewayResult<Vec<u8>>;

    /// Decrypt with a live session key and a valid capability for the
    /// ciphertext's identity.
    async fn decrypt(
        &self,
        ciphertext: &[u8],
        session_key: &SessionKey,
        capability: &CapabilityRef,
    ) -> GatewayResult<Vec<u8>>;
}

/// Deterministic local gateway: AES-256-GCM with a key derived from the
/// identity via HKDF-SHA256, and an in-process registry of valid grants.
///
/// Stands in for the encryption network in development and tests; the
/// envelope format is `nonce || ciphertext || tag`.
#[derive(Clone, Default)]
pub struct LocalGateway {
    /// grant_id -> profile_id the grant authorizes.
    grants: Arc<RwLock<HashMap<String, String>>>,
}

impl LocalGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a grant as valid for a profile (mirrors an on-ledger access
    /// purchase).
    pub fn register_grant(&self, grant_id: &str, profile_id: &str) {
        self.grants
            .write()
            .unwrap()
            .insert(grant_id.to_string(), profile_id.to_string());
    }

    /// Revoke a grant.
    pub fn revoke_grant(&self, grant_id: &str) {
        self.grants.write().unwrap().remove(grant_id);
    }

    fn grant_authorizes(&self, capability: &CapabilityRef) -> bool {
        self.grants
            .read()
            .unwrap()
            .get(&capability.grant_id)
            .is_some_and(|profile| profile == &capability.profile_id)
    }
}

/// Derive the per-identity AES-256 key via HKDF with domain separation.
fn derive_content_key(identity: &str) -> GatewayResult<Zeroizing<Vec<u8>>> {
    let hkdf = Hkdf::<Sha256>::new(
        Some(b"patronage-content-encryption-v1"),
        identity.as_bytes(),
    );
    let mut key = Zeroizing::new(vec![0u8; 32]);
    hkdf.expand(b"aes-256-gcm-key", &mut key)
        .map_err(|e| GatewayError::EncryptionFailed(format!("HKDF expand failed: {e}")))?;
    Ok(key)
}

fn generate_nonce() -> GatewayResult<[u8; NONCE_LEN]> {
    let rng = SystemRandom::new();
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut nonce)
        .map_err(|_| GatewayError::EncryptionFailed("RNG failure".to_string()))?;
    Ok(nonce)
}

fn aead_key(identity: &str) -> GatewayResult<LessSafeKey> {
    let key_bytes = derive_content_key(identity)?;
    let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
        .map_err(|e| GatewayError::EncryptionFailed(format!("key creation failed: {e}")))?;
    Ok(LessSafeKey::new(unbound))
}

#[async_trait]
impl EncryptionGateway for LocalGateway {
    async fn encrypt(&self, identity: &str, plaintext: &[u8]) -> GatewayResult<Vec<u8>> {
        let key = aead_key(identity)?;
        let nonce_bytes = generate_nonce()?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut sealed = plaintext.to_vec();
        key.seal_in_place_append_tag(nonce, Aad::from(identity.as_bytes()), &mut sealed)
            .map_err(|e| GatewayError::EncryptionFailed(format!("seal failed: {e}")))?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + sealed.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&sealed);
        Ok(envelope)
    }

    async fn decrypt(
        &self,
        ciphertext: &[u8],
        session_key: &SessionKey,
        capability: &CapabilityRef,
    ) -> GatewayResult<Vec<u8>> {
        if session_key.is_expired(crate::crypto::session::now_ms()) {
            return Err(GatewayError::ExpiredSessionKey);
        }
        // The session key must belong to the requester of this profile's
        // identity, and the capability must authorize that same profile.
        if !self.grant_authorizes(capability) {
            return Err(GatewayError::DecryptionDenied);
        }
        if ciphertext.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(GatewayError::DecryptionFailed("ciphertext too short".to_string()));
        }

        let identity = &capability.profile_id;
        let key = aead_key(identity)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(&ciphertext[..NONCE_LEN]);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut opened = ciphertext[NONCE_LEN..].to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::from(identity.as_bytes()), &mut opened)
            .map_err(|_| GatewayError::DecryptionFailed("authentication failed".to_string()))?;
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::session::now_ms;

    fn live_key(identity: &str) -> SessionKey {
        SessionKey {
            identity: identity.to_string(),
            issued_at_ms: now_ms(),
            ttl_ms: 60_000,
            proof: vec![1, 2, 3],
        }
    }

    fn expired_key(identity: &str) -> SessionKey {
        SessionKey {
            identity: identity.to_string(),
            issued_at_ms: 0,
            ttl_ms: 1,
            proof: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_roundtrip() {
        let gateway = LocalGateway::new();
        gateway.register_grant("A1", "P1");

        let ciphertext = gateway.encrypt("P1", b"gated post").await.unwrap();
        assert_ne!(ciphertext, b"gated post");

        let plaintext = gateway
            .decrypt(
                &ciphertext,
                &live_key("0xABC"),
                &CapabilityRef {
                    grant_id: "A1".to_string(),
                    profile_id: "P1".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(plaintext, b"gated post");
    }

    #[tokio::test]
    async fn test_one_capability_decrypts_all_profile_content() {
        let gateway = LocalGateway::new();
        gateway.register_grant("A1", "P1");
        let cap = CapabilityRef {
            grant_id: "A1".to_string(),
            profile_id: "P1".to_string(),
        };

        let c1 = gateway.encrypt("P1", b"post one").await.unwrap();
        let c2 = gateway.encrypt("P1", b"post two").await.unwrap();
        assert_eq!(
            gateway.decrypt(&c1, &live_key("0xABC"), &cap).await.unwrap(),
            b"post one"
        );
        assert_eq!(
            gateway.decrypt(&c2, &live_key("0xABC"), &cap).await.unwrap(),
            b"post two"
        );
    }

    #[tokio::test]
    async fn test_expired_session_key_distinct_from_denied() {
        let gateway = LocalGateway::new();
        gateway.register_grant("A1", "P1");
        let ciphertext = gateway.encrypt("P1", b"gated").await.unwrap();

        let cap = CapabilityRef {
            grant_id: "A1".to_string(),
            profile_id: "P1".to_string(),
        };
        assert_eq!(
            gateway
                .decrypt(&ciphertext, &expired_key("0xABC"), &cap)
                .await
                .unwrap_err(),
            GatewayError::ExpiredSessionKey
        );

        let bad_cap = CapabilityRef {
            grant_id: "A-unknown".to_string(),
            profile_id: "P1".to_string(),
        };
        assert_eq!(
            gateway
                .decrypt(&ciphertext, &live_key("0xABC"), &bad_cap)
                .await
                .unwrap_err(),
            GatewayError::DecryptionDenied
        );
    }

    #[tokio::test]
    async fn test_capability_for_other_profile_denied() {
        let gateway = LocalGateway::new();
        gateway.register_grant("A1", "P1");
        let ciphertext = gateway.encrypt("P2", b"other profile").await.unwrap();

        // Grant is valid but bound to P1, not P2.
        let cap = CapabilityRef {
            grant_id: "A1".to_string(),
            profile_id: "P2".to_string(),
        };
        assert_eq!(
            gateway
                .decrypt(&ciphertext, &live_key("0xABC"), &cap)
                .await
                .unwrap_err(),
            GatewayError::DecryptionDenied
        );
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails() {
        let gateway = LocalGateway::new();
        gateway.register_grant("A1", "P1");
        let mut ciphertext = gateway.encrypt("P1", b"gated").await.unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;

        let cap = CapabilityRef {
            grant_id: "A1".to_string(),
            profile_id: "P1".to_string(),
        };
        assert!(matches!(
            gateway
                .decrypt(&ciphertext, &live_key("0xABC"), &cap)
                .await,
            Err(GatewayError::DecryptionFailed(_))
        ));
    }
}
