//! Publication saga end to end: gateway, blob pipeline, ledger commit, and
//! the supporter-side decrypt path.

use patronage::blob::mock::MockBlobStore;
use patronage::blob::{BlobPipeline, BlobStore};
use patronage::crypto::{CapabilityRef, LocalGateway, SessionKeyCache, SigningIssuer};
use patronage::ledger::mock::{MockLedgerClient, MockSigner};
use patronage::ledger::LedgerTx;
use patronage::publish::{
    ContentMetadata, PublicationPipeline, PublishCheckpoint, PublishRequest,
};
use patronage::types::ContentKind;
use std::sync::Arc;

fn request(bytes: &[u8], gated: bool) -> PublishRequest {
    PublishRequest {
        bytes: bytes.to_vec(),
        profile_id: "0xP1".to_string(),
        creator_cap_id: "0xCAP".to_string(),
        metadata: ContentMetadata {
            title: "First post".to_string(),
            description: "hello".to_string(),
            kind: ContentKind::Text,
        },
        gated,
    }
}

struct Fixture {
    gateway: Arc<LocalGateway>,
    blobs: MockBlobStore,
    ledger: MockLedgerClient,
    pipeline: PublicationPipeline,
}

fn fixture() -> Fixture {
    let gateway = Arc::new(LocalGateway::new());
    let blobs = MockBlobStore::new();
    let ledger = MockLedgerClient::new();
    let pipeline = PublicationPipeline::new(
        gateway.clone(),
        BlobPipeline::new(Arc::new(blobs.clone()), 5),
        Arc::new(ledger.clone()),
    );
    Fixture {
        gateway,
        blobs,
        ledger,
        pipeline,
    }
}

#[tokio::test]
async fn test_ungated_publish_commits_content_record() {
    let fx = fixture();
    let signer = MockSigner::new("0xOWNER");

    let receipt = fx
        .pipeline
        .publish(&request(b"public post", false), &signer)
        .await
        .unwrap();

    // Register, certify, commit: three signatures total.
    assert_eq!(signer.signature_count(), 3);
    assert!(!receipt.tx_digest.is_empty());

    let submitted = fx.ledger.submitted();
    assert_eq!(submitted.len(), 1);
    match &submitted[0] {
        LedgerTx::PublishContent {
            profile_id,
            blob_id,
            kind,
            ..
        } => {
            assert_eq!(profile_id, "0xP1");
            assert_eq!(blob_id, &receipt.blob_id.0);
            assert_eq!(kind, "text");
        }
    }

    // Ungated bytes are stored as-is and publicly readable.
    let stored = fx.blobs.read(&receipt.blob_id).await.unwrap();
    assert_eq!(stored, b"public post");
}

#[tokio::test]
async fn test_gated_publish_roundtrips_through_supporter_decrypt() {
    let fx = fixture();
    let signer = MockSigner::new("0xOWNER");

    let receipt = fx
        .pipeline
        .publish(&request(b"supporters only", true), &signer)
        .await
        .unwrap();

    // Stored blob is ciphertext, not the plaintext.
    let stored = fx.blobs.read(&receipt.blob_id).await.unwrap();
    assert_ne!(stored, b"supporters only");

    // A supporter with a valid capability decrypts through the session
    // cache; the capability's profile binds which identity is used.
    fx.gateway.register_grant("grant-1", "0xP1");
    let capability = CapabilityRef {
        grant_id: "grant-1".to_string(),
        profile_id: "0xP1".to_string(),
    };
    let cache = SessionKeyCache::new(Arc::new(SigningIssuer::new(60_000)));
    let supporter = MockSigner::new("0xBUYER");

    let plaintext = cache
        .decrypt_with_retry(
            fx.gateway.as_ref(),
            &stored,
            "0xBUYER",
            &capability,
            &supporter,
        )
        .await
        .unwrap();
    assert_eq!(plaintext, b"supporters only");
}

#[tokio::test]
async fn test_gated_decrypt_without_grant_is_denied() {
    let fx = fixture();
    let signer = MockSigner::new("0xOWNER");

    let receipt = fx
        .pipeline
        .publish(&request(b"supporters only", true), &signer)
        .await
        .unwrap();
    let stored = fx.blobs.read(&receipt.blob_id).await.unwrap();

    let capability = CapabilityRef {
        grant_id: "never-granted".to_string(),
        profile_id: "0xP1".to_string(),
    };
    let cache = SessionKeyCache::new(Arc::new(SigningIssuer::new(60_000)));
    let supporter = MockSigner::new("0xBUYER");

    let err = cache
        .decrypt_with_retry(
            fx.gateway.as_ref(),
            &stored,
            "0xBUYER",
            &capability,
            &supporter,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        patronage::crypto::GatewayError::DecryptionDenied
    ));
}

#[tokio::test]
async fn test_interrupted_saga_resumes_without_reregistering() {
    let fx = fixture();
    let signer = MockSigner::new("0xOWNER");
    let req = request(b"flaky network", false);

    fx.blobs.fail_next_certify();
    let err = fx.pipeline.publish(&req, &signer).await.unwrap_err();

    let checkpoint = err.checkpoint().cloned().unwrap();
    assert!(matches!(checkpoint, PublishCheckpoint::Registered { .. }));
    assert_eq!(fx.blobs.register_count(), 1);
    assert!(fx.ledger.submitted().is_empty());

    let receipt = fx
        .pipeline
        .resume(checkpoint, &req, &signer)
        .await
        .unwrap();

    // One registration across both attempts, and exactly one commit.
    assert_eq!(fx.blobs.register_count(), 1);
    assert_eq!(fx.ledger.submitted().len(), 1);
    assert_eq!(fx.blobs.read(&receipt.blob_id).await.unwrap(), b"flaky network");
}
