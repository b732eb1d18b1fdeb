use super::config::ServiceConfig;
use patronage::api::{build_router, AppState};
use patronage::ledger::rpc::JsonRpcLedgerClient;
use patronage::store::{MaterializedStore, MemoryStore, SqliteStore};
use patronage::sync::EventSynchronizer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Run the service
///
/// Starts the background synchronizer loop and serves the REST surface.
/// The store is opened per the `[store]` config section; the synchronizer
/// resumes from the cursors persisted there, so a restart never replays
/// already-applied events on the sqlite backend.
pub async fn execute(
    config_path: Option<String>,
    sync_interval: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    init_logging(&config);

    let store = open_store(&config).await?;
    let ledger = Arc::new(JsonRpcLedgerClient::new(config.ledger.rpc_url.clone()));
    let synchronizer = Arc::new(EventSynchronizer::new(
        ledger,
        store.clone(),
        config.ledger.page_size,
    ));

    // Initial catch-up before serving, then a periodic background pass.
    let report = synchronizer.sync().await;
    info!(
        processed = report.processed,
        errors = report.errors.len(),
        "initial sync pass complete"
    );

    let background = synchronizer.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(sync_interval.max(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = background.sync().await;
            if report.errors.is_empty() {
                info!(processed = report.processed, "sync pass complete");
            } else {
                for err in &report.errors {
                    warn!(error = %err, "sync pass error");
                }
            }
        }
    });

    let state = AppState {
        store,
        synchronizer,
        sync_token: config.api.sync_token.clone(),
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.api.listen_addr)
        .await
        .map_err(|e| format!("bind {}: {}", config.api.listen_addr, e))?;
    info!(addr = %config.api.listen_addr, "serving REST surface");

    axum::serve(listener, router)
        .await
        .map_err(|e| -> Box<dyn std::error::Error> {
            error!(error = %e, "server exited");
            Box::new(e)
        })?;

    Ok(())
}

pub(super) fn init_logging(config: &ServiceConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub(super) async fn open_store(
    config: &ServiceConfig,
) -> Result<Arc<dyn MaterializedStore>, Box<dyn std::error::Error>> {
    match config.store.backend.as_str() {
        "sqlite" => {
            let path = config.database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            info!(path = %path.display(), "opening sqlite store");
            Ok(Arc::new(SqliteStore::open(&path).await?))
        }
        "memory" => {
            warn!("memory store selected; state is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        other => Err(format!("unknown store backend '{}'", other).into()),
    }
}
