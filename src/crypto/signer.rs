//! File-keyed signer for operator tooling.
//!
//! Signs transaction intents with HMAC-SHA256 over a 32-byte key loaded
//! from a hex keyfile. Stands in for a wallet integration, which is outside
//! this service's scope.

use crate::ledger::{LedgerError, LedgerResult, TxSigner};
use async_trait::async_trait;
use ring::hmac;
use sha2::{Digest, Sha256};
use std::path::Path;
use zeroize::Zeroizing;

/// HMAC-based local signer.
pub struct LocalSigner {
    key: Zeroizing<Vec<u8>>,
    address: String,
}

impl LocalSigner {
    /// Build from raw key bytes (must be 32 bytes). The address is derived
    /// from the key's hash.
    pub fn from_key_bytes(key: &[u8]) -> LedgerResult<Self> {
        if key.len() != 32 {
            return Err(LedgerError::SigningFailed(
                "signing key must be 32 bytes".to_string(),
            ));
        }
        let address = format!("0x{}", hex::encode(&Sha256::digest(key)[..20]));
        Ok(Self {
            key: Zeroizing::new(key.to_vec()),
            address,
        })
    }

    /// Load a hex-encoded key from a file.
    pub fn from_keyfile(path: &Path) -> LedgerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::SigningFailed(format!("keyfile '{}': {e}", path.display()))
        })?;
        let key = hex::decode(contents.trim()).map_err(|e| {
            LedgerError::SigningFailed(format!("keyfile '{}': {e}", path.display()))
        })?;
        Self::from_key_bytes(&key)
    }
}

#[async_trait]
impl TxSigner for LocalSigner {
    async fn sign(&self, intent: &[u8]) -> LedgerResult<Vec<u8>> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.key);
        Ok(hmac::sign(&key, intent).as_ref().to_vec())
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}
