//! Registration → upload → certification saga.
//!
//! No step is rolled back on failure: a failure after `register` leaves an
//! orphaned, registered-but-uncertified blob on the network, and the
//! surviving [`PendingBlob`] handle is surfaced inside
//! [`BlobError::Interrupted`] so the caller can resume certification without
//! paying for a second registration.

use super::{BlobError, BlobId, BlobResult, BlobStore, PendingBlob};
use crate::ledger::TxSigner;
use std::sync::Arc;
use tracing::{debug, info};

/// Stage of the blob saga at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobStage {
    Register,
    Upload,
    Propagation,
    Certify,
}

/// Drives the blob saga against a [`BlobStore`].
#[derive(Clone)]
pub struct BlobPipeline {
    store: Arc<dyn BlobStore>,
    epochs: u64,
}

impl BlobPipeline {
    pub fn new(store: Arc<dyn BlobStore>, epochs: u64) -> Self {
        Self { store, epochs }
    }

    /// Run the full saga. Exactly two signatures are requested from
    /// `signer`: one for registration, one for certification.
    pub async fn upload_and_certify(
        &self,
        bytes: &[u8],
        owner: &str,
        signer: &dyn TxSigner,
    ) -> BlobResult<BlobId> {
        let handle = self
            .store
            .register(bytes, owner, self.epochs, signer)
            .await?;
        debug!(blob_id = %handle.blob_id, size = handle.size, "blob registered");

        self.finish(&handle, Some(bytes), signer).await
    }

    /// Resume a saga from a surviving handle: re-upload if the data is
    /// still at hand, then certify. Never re-registers.
    pub async fn resume_certify(
        &self,
        handle: &PendingBlob,
        bytes: Option<&[u8]>,
        signer: &dyn TxSigner,
    ) -> BlobResult<BlobId> {
        self.finish(handle, bytes, signer).await
    }

    async fn finish(
        &self,
        handle: &PendingBlob,
        bytes: Option<&[u8]>,
        signer: &dyn TxSigner,
    ) -> BlobResult<BlobId> {
        if let Some(bytes) = bytes {
            if let Err(e) = self.store.upload(handle, bytes).await {
                return Err(interrupted(BlobStage::Upload, handle, e));
            }
            // Bounded wait only. An unpropagated upload is reported, not
            // polled for.
            match self.store.await_propagation(handle).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(blob_id = %handle.blob_id, "propagation quorum not yet observed");
                }
                Err(e) => return Err(interrupted(BlobStage::Propagation, handle, e)),
            }
        }

        match self.store.certify(handle, signer).await {
            Ok(blob_id) => {
                info!(%blob_id, "blob certified");
                Ok(blob_id)
            }
            Err(e) => Err(interrupted(BlobStage::Certify, handle, e)),
        }
    }
}

fn interrupted(stage: BlobStage, handle: &PendingBlob, source: BlobError) -> BlobError {
    // Already-wrapped failures keep their original stage.
    if matches!(source, BlobError::Interrupted { .. }) {
        return source;
    }
    BlobError::Interrupted {
        stage,
        handle: handle.clone(),
        reason: source.to_string(),
    }
}
