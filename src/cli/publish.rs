use patronage::blob::http::HttpBlobStore;
use patronage::blob::BlobPipeline;
use patronage::crypto::{LocalGateway, LocalSigner};
use patronage::ledger::rpc::JsonRpcLedgerClient;
use patronage::publish::{
    ContentMetadata, PublicationPipeline, PublishCheckpoint, PublishRequest,
};
use patronage::types::ContentKind;
use std::path::Path;
use std::sync::Arc;

/// Publish a content file
///
/// Drives the full saga: encrypt when gated, register and certify the blob
/// on the storage network, then commit the content record on the ledger.
/// On a partial failure the resume point is printed so the operator can see
/// how far the saga got; a re-run registers a fresh blob but never produces
/// a duplicate content record for a blob that was already committed.
pub async fn execute(
    config_path: Option<String>,
    file: String,
    profile: String,
    creator_cap: String,
    title: String,
    description: String,
    kind: String,
    gated: bool,
    keyfile: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    super::run::init_logging(&config);

    let publisher_url = config
        .storage
        .publisher_url
        .clone()
        .ok_or("storage.publisher_url is not configured")?;
    let aggregator_url = config
        .storage
        .aggregator_url
        .clone()
        .ok_or("storage.aggregator_url is not configured")?;

    let bytes = std::fs::read(&file).map_err(|e| format!("read '{}': {}", file, e))?;
    let signer = LocalSigner::from_keyfile(Path::new(&keyfile))?;

    let blob_store = Arc::new(HttpBlobStore::new(
        publisher_url,
        aggregator_url,
        config.storage.fallback_aggregator_url.clone(),
    ));
    let ledger = Arc::new(JsonRpcLedgerClient::new(config.ledger.rpc_url.clone()));
    let pipeline = PublicationPipeline::new(
        Arc::new(LocalGateway::new()),
        BlobPipeline::new(blob_store, config.storage.epochs),
        ledger,
    );

    let request = PublishRequest {
        bytes,
        profile_id: profile,
        creator_cap_id: creator_cap,
        metadata: ContentMetadata {
            title,
            description,
            kind: ContentKind::from(kind),
        },
        gated,
    };

    println!(
        "Publishing {} byte(s){}...",
        request.bytes.len(),
        if gated { " (gated)" } else { "" }
    );

    match pipeline.publish(&request, &signer).await {
        Ok(receipt) => {
            println!("Published");
            println!("  Blob id: {}", receipt.blob_id);
            println!("  Commit digest: {}", receipt.tx_digest);
            Ok(())
        }
        Err(err) => {
            if let Some(checkpoint) = err.checkpoint() {
                match checkpoint {
                    PublishCheckpoint::Registered { handle, .. } => {
                        println!("Interrupted after registration");
                        println!("  Pending blob id: {}", handle.blob_id);
                        println!("  Register digest: {}", handle.register_digest);
                    }
                    PublishCheckpoint::Certified { blob_id } => {
                        println!("Interrupted after certification");
                        println!("  Certified blob id: {}", blob_id);
                        println!("  Only the ledger commit remains");
                    }
                    PublishCheckpoint::Start | PublishCheckpoint::Prepared { .. } => {}
                }
            }
            Err(err.to_string().into())
        }
    }
}
