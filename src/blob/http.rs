//! HTTP client for the storage network's publisher and aggregator
//! endpoints.
//!
//! Reads try the primary aggregator first and fall back to the secondary
//! when the primary fails; writes go through the publisher.

use super::{BlobError, BlobId, BlobResult, BlobStore, PendingBlob};
use crate::ledger::TxSigner;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on the propagation wait. Callers needing stronger
/// guarantees re-invoke `upload`.
const PROPAGATION_WAIT: Duration = Duration::from_secs(5);

/// Storage-network client over HTTP.
#[derive(Clone)]
pub struct HttpBlobStore {
    http: reqwest::Client,
    publisher_url: String,
    aggregator_url: String,
    fallback_aggregator_url: Option<String>,
}

impl HttpBlobStore {
    pub fn new(
        publisher_url: impl Into<String>,
        aggregator_url: impl Into<String>,
        fallback_aggregator_url: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            publisher_url: publisher_url.into(),
            aggregator_url: aggregator_url.into(),
            fallback_aggregator_url,
        }
    }

    async fn fetch(&self, base: &str, blob_id: &BlobId) -> Result<Vec<u8>, String> {
        let url = format!("{base}/v1/blobs/{blob_id}");
        let response = self.http.get(&url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("{url}: {}", response.status()));
        }
        Ok(response.bytes().await.map_err(|e| e.to_string())?.to_vec())
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn register(
        &self,
        bytes: &[u8],
        owner: &str,
        epochs: u64,
        signer: &dyn TxSigner,
    ) -> BlobResult<PendingBlob> {
        let intent = format!("register:{}:{}:{}", owner, bytes.len(), epochs);
        let signature = signer
            .sign(intent.as_bytes())
            .await
            .map_err(|e| BlobError::SigningFailed(e.to_string()))?;

        let body = serde_json::json!({
            "size": bytes.len(),
            "owner": owner,
            "epochs": epochs,
            "signature": hex::encode(signature),
        });
        let response = self
            .http
            .post(format!("{}/v1/blobs/register", self.publisher_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| BlobError::RegisterFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BlobError::RegisterFailed(response.status().to_string()));
        }
        let result: Value = response
            .json()
            .await
            .map_err(|e| BlobError::RegisterFailed(e.to_string()))?;

        let blob_id = result
            .get("blobId")
            .and_then(Value::as_str)
            .ok_or_else(|| BlobError::RegisterFailed("missing blobId".to_string()))?;
        let register_digest = result
            .get("txDigest")
            .and_then(Value::as_str)
            .ok_or_else(|| BlobError::RegisterFailed("missing txDigest".to_string()))?;
        Ok(PendingBlob {
            register_digest: register_digest.to_string(),
            blob_id: BlobId(blob_id.to_string()),
            size: bytes.len() as u64,
            epochs,
        })
    }

    async fn upload(&self, handle: &PendingBlob, bytes: &[u8]) -> BlobResult<()> {
        let url = format!("{}/v1/blobs/{}", self.publisher_url, handle.blob_id);
        let response = self
            .http
            .put(&url)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| BlobError::UploadFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BlobError::UploadFailed(response.status().to_string()));
        }
        debug!(blob_id = %handle.blob_id, size = bytes.len(), "blob uploaded");
        Ok(())
    }

    async fn await_propagation(&self, handle: &PendingBlob) -> BlobResult<bool> {
        // One bounded status probe, not a poll-until-ready loop.
        let url = format!(
            "{}/v1/blobs/{}/status",
            self.publisher_url, handle.blob_id
        );
        let probe = self.http.get(&url).timeout(PROPAGATION_WAIT).send().await;
        match probe {
            Ok(response) if response.status().is_success() => {
                let status: Value = response
                    .json()
                    .await
                    .map_err(|e| BlobError::UploadFailed(e.to_string()))?;
                Ok(status
                    .get("quorum")
                    .and_then(Value::as_bool)
                    .unwrap_or(false))
            }
            Ok(_) | Err(_) => Ok(false),
        }
    }

    async fn certify(&self, handle: &PendingBlob, signer: &dyn TxSigner) -> BlobResult<BlobId> {
        let intent = format!("certify:{}:{}", handle.blob_id, handle.register_digest);
        let signature = signer
            .sign(intent.as_bytes())
            .await
            .map_err(|e| BlobError::SigningFailed(e.to_string()))?;

        let url = format!(
            "{}/v1/blobs/{}/certify",
            self.publisher_url, handle.blob_id
        );
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "signature": hex::encode(signature) }))
            .send()
            .await
            .map_err(|e| BlobError::CertifyFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BlobError::CertifyFailed(response.status().to_string()));
        }
        Ok(handle.blob_id.clone())
    }

    async fn read(&self, blob_id: &BlobId) -> BlobResult<Vec<u8>> {
        match self.fetch(&self.aggregator_url, blob_id).await {
            Ok(bytes) => Ok(bytes),
            Err(primary_err) => {
                let Some(fallback) = &self.fallback_aggregator_url else {
                    return Err(BlobError::ReadFailed(primary_err));
                };
                warn!(%blob_id, error = %primary_err, "primary aggregator failed, trying fallback");
                self.fetch(fallback, blob_id)
                    .await
                    .map_err(|fallback_err| {
                        BlobError::ReadFailed(format!("{primary_err}; {fallback_err}"))
                    })
            }
        }
    }
}
