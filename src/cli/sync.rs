use patronage::ledger::rpc::JsonRpcLedgerClient;
use patronage::sync::EventSynchronizer;
use std::sync::Arc;

/// Run a single sync pass and print the report.
///
/// Useful for cron-driven deployments and for verifying connectivity
/// before starting the service proper.
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    super::run::init_logging(&config);

    let store = super::run::open_store(&config).await?;
    let ledger = Arc::new(JsonRpcLedgerClient::new(config.ledger.rpc_url.clone()));
    let synchronizer = EventSynchronizer::new(ledger, store.clone(), config.ledger.page_size);

    let report = synchronizer.sync().await;
    println!("Processed {} event(s)", report.processed);
    if report.errors.is_empty() {
        println!("No errors");
    } else {
        println!("{} error(s):", report.errors.len());
        for err in &report.errors {
            println!("  - {}", err);
        }
    }

    let skipped = store.skipped_events().await?;
    if !skipped.is_empty() {
        println!("{} event(s) skipped in total (see skipped_events):", skipped.len());
        for event in skipped.iter().rev().take(5) {
            println!("  - [{}] {}: {}", event.event_type, event.cursor_token, event.reason);
        }
    }

    Ok(())
}
