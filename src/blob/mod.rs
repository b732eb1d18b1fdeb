//! Trait abstractions for the decentralized blob storage network.
//!
//! Registration and certification are ledger-side operations that each cost
//! one caller-supplied signature; the data upload itself is unsigned. The
//! resumable saga over these steps lives in [`pipeline`].

pub mod http;
pub mod mock;
pub mod pipeline;

use crate::ledger::TxSigner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use pipeline::{BlobPipeline, BlobStage};

/// Content-addressed blob identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId(pub String);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered-but-uncertified blob handle.
///
/// Survives a pipeline failure so the caller can resume certification
/// without paying for a second registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBlob {
    /// Digest of the registration transaction.
    pub register_digest: String,
    /// The blob id the network will assign once certified.
    pub blob_id: BlobId,
    /// Registered size in bytes.
    pub size: u64,
    /// Storage duration in epochs.
    pub epochs: u64,
}

/// Result type for blob storage operations.
pub type BlobResult<T> = Result<T, BlobError>;

/// Blob storage errors.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("registration failed: {0}")]
    RegisterFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("certification failed: {0}")]
    CertifyFailed(String),

    #[error("blob not found: {0}")]
    NotFound(BlobId),

    #[error("read failed on primary and fallback: {0}")]
    ReadFailed(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// The saga stopped after at least one external commitment. Carries the
    /// surviving handle so the caller can resume instead of re-registering.
    #[error("pipeline interrupted at {stage:?}: {reason}")]
    Interrupted {
        stage: BlobStage,
        handle: PendingBlob,
        reason: String,
    },
}

/// Trait abstraction for the storage network.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Register storage space for `bytes` on the ledger. Requires one
    /// signed transaction; leaves an orphaned registration if the caller
    /// never certifies.
    async fn register(
        &self,
        bytes: &[u8],
        owner: &str,
        epochs: u64,
        signer: &dyn TxSigner,
    ) -> BlobResult<PendingBlob>;

    /// Push the data to the storage nodes. Unsigned; idempotent.
    async fn upload(&self, handle: &PendingBlob, bytes: &[u8]) -> BlobResult<()>;

    /// Bounded wait for the upload to propagate. Returns whether a storage
    /// quorum has observed the data; never loops until ready. Callers that
    /// need stronger guarantees re-invoke [`BlobStore::upload`].
    async fn await_propagation(&self, handle: &PendingBlob) -> BlobResult<bool>;

    /// Commit the availability certificate on the ledger. Requires one
    /// signed transaction.
    async fn certify(&self, handle: &PendingBlob, signer: &dyn TxSigner) -> BlobResult<BlobId>;

    /// Public fetch by blob id, falling back to the secondary aggregator
    /// when the primary endpoint fails.
    async fn read(&self, blob_id: &BlobId) -> BlobResult<Vec<u8>>;
}
