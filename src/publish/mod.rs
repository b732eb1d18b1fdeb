//! Content publication pipeline.
//!
//! A client-driven saga: optional encryption, blob storage commitment, then
//! the final "publish content" ledger commit. There is no cross-system
//! transaction and no rollback of already-submitted external commitments;
//! instead every failure after the first commitment carries a typed
//! [`PublishCheckpoint`] so the caller resumes from where it stopped rather
//! than re-paying earlier stages.

use crate::blob::{BlobError, BlobId, BlobPipeline, PendingBlob};
use crate::crypto::EncryptionGateway;
use crate::ledger::{LedgerClient, LedgerTx, TxSigner};
use crate::types::ContentKind;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// User-facing content fields carried through to the ledger commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMetadata {
    pub title: String,
    pub description: String,
    pub kind: ContentKind,
}

/// One publication request.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub bytes: Vec<u8>,
    pub profile_id: String,
    /// The creator capability object proving publish rights on the profile.
    pub creator_cap_id: String,
    pub metadata: ContentMetadata,
    /// Encrypt under the profile identity before storing.
    pub gated: bool,
}

/// Successful publication: the certified blob and the commit digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub blob_id: BlobId,
    pub tx_digest: String,
}

/// Pipeline stage names for failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Encrypt,
    Store,
    Commit,
}

/// Resumable position in the saga.
///
/// `Registered` carries the exact payload that was registered: a gated
/// payload must never be re-encrypted on resume, since a fresh nonce would
/// no longer match the registered blob id.
#[derive(Debug, Clone)]
pub enum PublishCheckpoint {
    /// Nothing external has happened yet.
    Start,
    /// Payload prepared (encrypted if gated) but not yet registered.
    Prepared { payload: Vec<u8> },
    /// Blob registered on the ledger, certification outstanding.
    Registered {
        handle: PendingBlob,
        payload: Vec<u8>,
    },
    /// Blob certified; only the content commit remains.
    Certified { blob_id: BlobId },
}

/// Publication errors. `Partial` means at least one external commitment
/// succeeded; its checkpoint is the resume point.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publication failed at {stage:?}: {reason}")]
    Failed { stage: PublishStage, reason: String },

    #[error("publication interrupted at {stage:?}: {reason}")]
    Partial {
        stage: PublishStage,
        checkpoint: PublishCheckpoint,
        reason: String,
    },
}

impl PublishError {
    /// The resume point, when one exists.
    pub fn checkpoint(&self) -> Option<&PublishCheckpoint> {
        match self {
            PublishError::Partial { checkpoint, .. } => Some(checkpoint),
            PublishError::Failed { .. } => None,
        }
    }
}

/// Composes the encryption gateway, blob pipeline, and ledger commit.
#[derive(Clone)]
pub struct PublicationPipeline {
    gateway: Arc<dyn EncryptionGateway>,
    blobs: BlobPipeline,
    ledger: Arc<dyn LedgerClient>,
}

impl PublicationPipeline {
    pub fn new(
        gateway: Arc<dyn EncryptionGateway>,
        blobs: BlobPipeline,
        ledger: Arc<dyn LedgerClient>,
    ) -> Self {
        Self {
            gateway,
            blobs,
            ledger,
        }
    }

    /// Run the full saga from the start.
    pub async fn publish(
        &self,
        request: &PublishRequest,
        signer: &dyn TxSigner,
    ) -> Result<PublishReceipt, PublishError> {
        self.resume(PublishCheckpoint::Start, request, signer).await
    }

    /// Continue a saga from a checkpoint. Resuming from `Certified`
    /// performs only the final ledger commit.
    pub async fn resume(
        &self,
        checkpoint: PublishCheckpoint,
        request: &PublishRequest,
        signer: &dyn TxSigner,
    ) -> Result<PublishReceipt, PublishError> {
        let checkpoint = match checkpoint {
            PublishCheckpoint::Start => {
                let payload = self.prepare(request).await?;
                PublishCheckpoint::Prepared { payload }
            }
            other => other,
        };

        let checkpoint = match checkpoint {
            PublishCheckpoint::Prepared { payload } => {
                let blob_id = self
                    .blobs
                    .upload_and_certify(&payload, &signer.address(), signer)
                    .await
                    .map_err(|e| store_error(e, &payload))?;
                PublishCheckpoint::Certified { blob_id }
            }
            PublishCheckpoint::Registered { handle, payload } => {
                let blob_id = self
                    .blobs
                    .resume_certify(&handle, Some(&payload), signer)
                    .await
                    .map_err(|e| store_error(e, &payload))?;
                PublishCheckpoint::Certified { blob_id }
            }
            other => other,
        };

        match checkpoint {
            PublishCheckpoint::Certified { blob_id } => self.commit(request, blob_id, signer).await,
            // resume() above always drives earlier checkpoints to Certified.
            _ => unreachable!("unprocessed checkpoint"),
        }
    }

    async fn prepare(&self, request: &PublishRequest) -> Result<Vec<u8>, PublishError> {
        if !request.gated {
            return Ok(request.bytes.clone());
        }
        self.gateway
            .encrypt(&request.profile_id, &request.bytes)
            .await
            .map_err(|e| PublishError::Failed {
                stage: PublishStage::Encrypt,
                reason: e.to_string(),
            })
    }

    async fn commit(
        &self,
        request: &PublishRequest,
        blob_id: BlobId,
        signer: &dyn TxSigner,
    ) -> Result<PublishReceipt, PublishError> {
        let tx = LedgerTx::PublishContent {
            profile_id: request.profile_id.clone(),
            creator_cap_id: request.creator_cap_id.clone(),
            title: request.metadata.title.clone(),
            description: request.metadata.description.clone(),
            blob_id: blob_id.0.clone(),
            kind: request.metadata.kind.as_str().to_string(),
        };
        match self.ledger.submit(tx, signer).await {
            Ok(receipt) => {
                info!(%blob_id, digest = %receipt.digest, "content published");
                Ok(PublishReceipt {
                    blob_id,
                    tx_digest: receipt.digest,
                })
            }
            Err(e) => Err(PublishError::Partial {
                stage: PublishStage::Commit,
                checkpoint: PublishCheckpoint::Certified { blob_id },
                reason: e.to_string(),
            }),
        }
    }
}

/// Map a blob saga failure onto a publish checkpoint. An interruption after
/// registration is resumable; a registration that never happened is not.
fn store_error(error: BlobError, payload: &[u8]) -> PublishError {
    match error {
        BlobError::Interrupted {
            stage,
            handle,
            reason,
        } => PublishError::Partial {
            stage: PublishStage::Store,
            checkpoint: PublishCheckpoint::Registered {
                handle,
                payload: payload.to_vec(),
            },
            reason: format!("blob saga stopped at {stage:?}: {reason}"),
        },
        other => PublishError::Failed {
            stage: PublishStage::Store,
            reason: other.to_string(),
        },
    }
}
