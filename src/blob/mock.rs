//! Mock blob store for testing.

use super::{BlobError, BlobId, BlobResult, BlobStore, PendingBlob};
use crate::ledger::TxSigner;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory blob store with per-stage fault injection.
#[derive(Clone, Default)]
pub struct MockBlobStore {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Uploaded (not yet certified) data keyed by blob id.
    staged: HashMap<String, Vec<u8>>,
    /// Certified, publicly readable blobs.
    certified: HashMap<String, Vec<u8>>,
    register_count: u64,
    fail_next_upload: bool,
    fail_next_certify: bool,
    /// Whether await_propagation reports quorum (defaults to true).
    propagation_quorum: Option<bool>,
    /// Simulate the primary aggregator being down; reads succeed only via
    /// the fallback path.
    primary_read_down: bool,
    fallback_reads: u64,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_upload(&self) {
        self.state.lock().unwrap().fail_next_upload = true;
    }

    pub fn fail_next_certify(&self) {
        self.state.lock().unwrap().fail_next_certify = true;
    }

    pub fn set_propagation_quorum(&self, quorum: bool) {
        self.state.lock().unwrap().propagation_quorum = Some(quorum);
    }

    pub fn set_primary_read_down(&self, down: bool) {
        self.state.lock().unwrap().primary_read_down = down;
    }

    pub fn register_count(&self) -> u64 {
        self.state.lock().unwrap().register_count
    }

    pub fn fallback_reads(&self) -> u64 {
        self.state.lock().unwrap().fallback_reads
    }
}

/// Content-addressed id, same bytes -> same id.
fn content_id(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn register(
        &self,
        bytes: &[u8],
        _owner: &str,
        epochs: u64,
        signer: &dyn TxSigner,
    ) -> BlobResult<PendingBlob> {
        let signature = signer
            .sign(b"register")
            .await
            .map_err(|e| BlobError::SigningFailed(e.to_string()))?;
        let mut state = self.state.lock().unwrap();
        state.register_count += 1;
        Ok(PendingBlob {
            register_digest: format!("reg-{}", hex::encode(&signature[..signature.len().min(4)])),
            blob_id: BlobId(content_id(bytes)),
            size: bytes.len() as u64,
            epochs,
        })
    }

    async fn upload(&self, handle: &PendingBlob, bytes: &[u8]) -> BlobResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_upload {
            state.fail_next_upload = false;
            return Err(BlobError::UploadFailed("injected upload failure".to_string()));
        }
        if content_id(bytes) != handle.blob_id.0 {
            return Err(BlobError::UploadFailed(
                "data does not match registered blob id".to_string(),
            ));
        }
        state.staged.insert(handle.blob_id.0.clone(), bytes.to_vec());
        Ok(())
    }

    async fn await_propagation(&self, handle: &PendingBlob) -> BlobResult<bool> {
        let state = self.state.lock().unwrap();
        let uploaded = state.staged.contains_key(&handle.blob_id.0);
        Ok(uploaded && state.propagation_quorum.unwrap_or(true))
    }

    async fn certify(&self, handle: &PendingBlob, signer: &dyn TxSigner) -> BlobResult<BlobId> {
        signer
            .sign(b"certify")
            .await
            .map_err(|e| BlobError::SigningFailed(e.to_string()))?;
        let mut state = self.state.lock().unwrap();
        if state.fail_next_certify {
            state.fail_next_certify = false;
            return Err(BlobError::CertifyFailed("injected certify failure".to_string()));
        }
        match state.staged.remove(&handle.blob_id.0) {
            Some(bytes) => {
                state.certified.insert(handle.blob_id.0.clone(), bytes);
                Ok(handle.blob_id.clone())
            }
            None => {
                // Re-certifying already certified data is a no-op.
                if state.certified.contains_key(&handle.blob_id.0) {
                    Ok(handle.blob_id.clone())
                } else {
                    Err(BlobError::CertifyFailed("no uploaded data".to_string()))
                }
            }
        }
    }

    async fn read(&self, blob_id: &BlobId) -> BlobResult<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        let bytes = state
            .certified
            .get(&blob_id.0)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(blob_id.clone()))?;
        if state.primary_read_down {
            // Fallback aggregator path.
            state.fallback_reads += 1;
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockSigner;

    #[tokio::test]
    async fn test_register_upload_certify_read() {
        let store = MockBlobStore::new();
        let signer = MockSigner::new("0xOWNER");

        let handle = store.register(b"bytes", "0xOWNER", 3, &signer).await.unwrap();
        store.upload(&handle, b"bytes").await.unwrap();
        assert!(store.await_propagation(&handle).await.unwrap());
        let blob_id = store.certify(&handle, &signer).await.unwrap();
        assert_eq!(store.read(&blob_id).await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn test_upload_rejects_mismatched_data() {
        let store = MockBlobStore::new();
        let signer = MockSigner::new("0xOWNER");
        let handle = store.register(b"bytes", "0xOWNER", 3, &signer).await.unwrap();
        assert!(store.upload(&handle, b"other").await.is_err());
    }

    #[tokio::test]
    async fn test_read_unknown_blob() {
        let store = MockBlobStore::new();
        let missing = BlobId("deadbeef".to_string());
        assert!(matches!(
            store.read(&missing).await,
            Err(BlobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fallback_read_path() {
        let store = MockBlobStore::new();
        let signer = MockSigner::new("0xOWNER");
        let handle = store.register(b"bytes", "0xOWNER", 3, &signer).await.unwrap();
        store.upload(&handle, b"bytes").await.unwrap();
        let blob_id = store.certify(&handle, &signer).await.unwrap();

        store.set_primary_read_down(true);
        assert_eq!(store.read(&blob_id).await.unwrap(), b"bytes");
        assert_eq!(store.fallback_reads(), 1);
    }
}
