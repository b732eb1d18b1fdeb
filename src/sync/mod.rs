//! Event synchronizer: pulls pages of ledger events and applies them to the
//! materialized store.
//!
//! Each tracked event type progresses independently behind its own durable
//! cursor. Errors are data, not control flow: a failed event is recorded
//! (both in the returned report and in the store's skipped-event table) and
//! the pass continues. A page-fetch failure leaves that type's cursor
//! untouched so the whole page is retried on the next invocation.
//!
//! Designed to be invoked repeatedly by an external trigger. Concurrent
//! invocations are safe but uncoordinated: store writes are idempotent and
//! the cursor write is a last-wins single value, so the worst case is a
//! duplicate page fetch.

use crate::ledger::events::{self, EventKind};
use crate::ledger::{EventEnvelope, LedgerClient, LedgerResult};
use crate::store::{MaterializedStore, SkippedEvent};
use crate::types::{CreatorProfile, ProfilePatch};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Outcome of one synchronization pass over all tracked event types.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Events applied successfully across all types.
    pub processed: usize,
    /// Human-readable descriptions of every failure encountered. Never
    /// aborts the pass.
    pub errors: Vec<String>,
}

/// Polls the ledger event log and keeps the materialized store fresh.
pub struct EventSynchronizer {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn MaterializedStore>,
    page_size: usize,
}

impl EventSynchronizer {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn MaterializedStore>,
        page_size: usize,
    ) -> Self {
        Self {
            ledger,
            store,
            page_size: page_size.max(1),
        }
    }

    /// Run one pass: for each tracked event type, fetch at most one page of
    /// new events and apply them. No event type's failure affects another's
    /// progress.
    pub async fn sync(&self) -> SyncReport {
        let mut report = SyncReport::default();
        for event_type in events::TRACKED_EVENT_TYPES {
            self.sync_event_type(event_type, &mut report).await;
        }
        report
    }

    async fn sync_event_type(&self, event_type: &str, report: &mut SyncReport) {
        let after = match self.store.load_cursor(event_type).await {
            Ok(token) => token.as_deref().and_then(crate::ledger::EventCursor::from_token),
            Err(e) => {
                report.errors.push(format!("{event_type}: cursor load failed: {e}"));
                return;
            }
        };

        let page = match self
            .ledger
            .query_events(event_type, after.as_ref(), self.page_size)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                // Transient: cursor untouched, whole page retried next pass.
                warn!(event_type, error = %e, "event page fetch failed");
                report.errors.push(format!("{event_type}: page fetch failed: {e}"));
                return;
            }
        };

        if page.events.is_empty() {
            debug!(event_type, "no new events");
            return;
        }

        for envelope in &page.events {
            match self.apply_event(envelope).await {
                Ok(()) => report.processed += 1,
                Err(reason) => {
                    warn!(
                        event_type,
                        cursor = %envelope.cursor,
                        %reason,
                        "event skipped"
                    );
                    report
                        .errors
                        .push(format!("{event_type} @ {}: {reason}", envelope.cursor));
                    let record = SkippedEvent {
                        event_type: event_type.to_string(),
                        cursor_token: envelope.cursor.to_token(),
                        reason,
                        skipped_at_ms: now_ms(),
                    };
                    if let Err(e) = self.store.record_skipped_event(record).await {
                        report
                            .errors
                            .push(format!("{event_type}: skipped-event record failed: {e}"));
                    }
                }
            }
        }

        // Advance to the last *paged* position, not the last applied one:
        // a poison event is skipped rather than refetched forever.
        if let Some(next) = &page.next_cursor {
            if let Err(e) = self.store.store_cursor(event_type, &next.to_token()).await {
                report.errors.push(format!("{event_type}: cursor store failed: {e}"));
            }
        }
    }

    /// Decode, resolve, and apply a single event. The error string feeds
    /// both the report and the durable skipped-event record.
    async fn apply_event(&self, envelope: &EventEnvelope) -> Result<(), String> {
        let kind = events::decode(envelope).map_err(|e| e.to_string())?;
        match kind {
            EventKind::ProfileCreated { profile_id } => {
                let creator = self
                    .resolve_profile(&profile_id, envelope.timestamp_ms)
                    .await
                    .map_err(|e| e.to_string())?;
                self.store
                    .upsert_creator(creator)
                    .await
                    .map_err(|e| e.to_string())
            }
            EventKind::ProfileUpdated { profile_id } => {
                // Resolve the full object and patch the mutable fields;
                // counters stay with content/purchase application.
                let current = self
                    .resolve_profile(&profile_id, envelope.timestamp_ms)
                    .await
                    .map_err(|e| e.to_string())?;
                let patch = ProfilePatch {
                    profile_id: current.profile_id,
                    name: Some(current.name),
                    bio: Some(current.bio),
                    avatar_blob_id: current.avatar_blob_id,
                    alias: current.alias,
                    price: Some(current.price),
                };
                match self.store.apply_profile_patch(patch.clone()).await {
                    Ok(()) => Ok(()),
                    // Update observed before its create event (types sync
                    // independently): fall back to a full upsert.
                    Err(crate::store::StoreError::NotFound(_)) => {
                        let creator = self
                            .resolve_profile(&patch.profile_id, envelope.timestamp_ms)
                            .await
                            .map_err(|e| e.to_string())?;
                        self.store
                            .upsert_creator(creator)
                            .await
                            .map_err(|e| e.to_string())
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
            EventKind::ContentPublished(content) => self
                .store
                .upsert_content(content)
                .await
                .map_err(|e| e.to_string()),
            EventKind::AccessPurchased(purchase) => self
                .store
                .add_access_purchase(purchase)
                .await
                .map_err(|e| e.to_string()),
        }
    }

    /// Read the profile object and map it to a full row. Fields absent from
    /// the event payload live on the object.
    async fn resolve_profile(
        &self,
        profile_id: &str,
        event_timestamp_ms: i64,
    ) -> LedgerResult<CreatorProfile> {
        let object = self.ledger.get_object(profile_id).await?;
        let fields = &object.fields;
        Ok(CreatorProfile {
            profile_id: profile_id.to_string(),
            owner: events::object_str(fields, "owner", profile_id)?,
            name: events::object_str(fields, "name", profile_id)?,
            bio: events::object_str(fields, "bio", profile_id)?,
            avatar_blob_id: events::object_opt_str(fields, "avatar_blob_id"),
            alias: events::object_opt_str(fields, "alias"),
            price: events::object_u64(fields, "price", profile_id)?,
            content_count: 0,
            total_supporters: 0,
            created_at_ms: event_timestamp_ms,
        })
    }
}

/// Resolve several profiles at once (used by backfill tooling).
pub async fn resolve_profiles(
    ledger: &dyn LedgerClient,
    profile_ids: &[String],
) -> LedgerResult<Vec<Option<serde_json::Value>>> {
    let objects = ledger.multi_get_objects(profile_ids).await?;
    Ok(objects.into_iter().map(|o| o.map(|o| o.fields)).collect())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedgerClient;
    use crate::ledger::{EventCursor, ObjectData};
    use crate::store::memory::MemoryStore;
    use crate::store::CursorStore;
    use serde_json::json;

    fn profile_object(id: &str, name: &str, price: u64) -> ObjectData {
        ObjectData {
            object_id: id.to_string(),
            fields: json!({
                "owner": "0xOWNER",
                "name": name,
                "bio": "a bio",
                "price": price,
            }),
        }
    }

    fn envelope(event_type: &str, seq: u64, payload: serde_json::Value) -> EventEnvelope {
        EventEnvelope {
            cursor: EventCursor::new("tx", seq),
            event_type: event_type.to_string(),
            timestamp_ms: 1_000 + seq as i64,
            payload,
        }
    }

    fn fixture() -> (MockLedgerClient, Arc<MemoryStore>, EventSynchronizer) {
        let ledger = MockLedgerClient::new();
        let store = Arc::new(MemoryStore::new());
        let synchronizer = EventSynchronizer::new(
            Arc::new(ledger.clone()),
            store.clone(),
            50,
        );
        (ledger, store, synchronizer)
    }

    #[tokio::test]
    async fn test_scenario_profile_content_purchase() {
        let (ledger, store, synchronizer) = fixture();
        ledger.put_object(profile_object("P1", "Creator One", 5));
        ledger.push_event(envelope(
            "ProfileCreated",
            0,
            json!({ "profile_id": "P1" }),
        ));
        ledger.push_event(envelope(
            "ContentPublished",
            1,
            json!({
                "content_id": "C1",
                "profile_id": "P1",
                "title": "First",
                "description": "d",
                "blob_id": "B1",
                "kind": "image",
            }),
        ));
        ledger.push_event(envelope(
            "AccessPurchased",
            2,
            json!({
                "purchase_id": "A1",
                "profile_id": "P1",
                "buyer": "0xABC",
                "amount": 5,
            }),
        ));

        let report = synchronizer.sync().await;
        assert_eq!(report.errors, Vec::<String>::new());
        assert_eq!(report.processed, 3);

        let creator = store.get_creator("P1").await.unwrap().unwrap();
        assert_eq!(creator.total_supporters, 1);
        assert_eq!(creator.content_count, 1);
        let content = store.content_by_profile("P1").await.unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].content_id, "C1");
        let supporters = store.supporters_of("P1").await.unwrap();
        assert_eq!(supporters.len(), 1);
        assert_eq!(supporters[0].purchase_id, "A1");

        // A second pass with no new events changes nothing.
        let report = synchronizer.sync().await;
        assert_eq!(report.processed, 0);
        let creator = store.get_creator("P1").await.unwrap().unwrap();
        assert_eq!(creator.total_supporters, 1);
        assert_eq!(creator.content_count, 1);
    }

    #[tokio::test]
    async fn test_replay_same_page_is_idempotent() {
        let (ledger, store, synchronizer) = fixture();
        ledger.put_object(profile_object("P1", "Creator One", 5));
        ledger.push_event(envelope(
            "AccessPurchased",
            0,
            json!({
                "purchase_id": "A1",
                "profile_id": "P1",
                "buyer": "0xABC",
                "amount": 5,
            }),
        ));
        ledger.push_event(envelope(
            "ProfileCreated",
            1,
            json!({ "profile_id": "P1" }),
        ));

        synchronizer.sync().await;
        // A malformed token decodes to None -> replay from stream start.
        store.store_cursor("AccessPurchased", "not-a-cursor").await.unwrap();
        synchronizer.sync().await;

        let creator = store.get_creator("P1").await.unwrap().unwrap();
        assert_eq!(creator.total_supporters, 1);
    }

    #[tokio::test]
    async fn test_poison_event_skipped_and_recorded() {
        let (ledger, store, synchronizer) = fixture();
        ledger.put_object(profile_object("P1", "Creator One", 5));
        ledger.push_event(envelope(
            "AccessPurchased",
            0,
            json!({ "purchase_id": "BAD" }),
        ));
        ledger.push_event(envelope(
            "AccessPurchased",
            1,
            json!({
                "purchase_id": "A1",
                "profile_id": "P1",
                "buyer": "0xABC",
                "amount": 5,
            }),
        ));

        let report = synchronizer.sync().await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.errors.len(), 1);

        // The poison event is durably visible to operators.
        let skipped = store.skipped_events().await.unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].cursor_token, "tx:0");

        // Cursor advanced past the poison event: next pass is clean.
        let report = synchronizer.sync().await;
        assert_eq!(report.processed, 0);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_page_fetch_failure_leaves_cursor() {
        let (ledger, store, synchronizer) = fixture();
        ledger.put_object(profile_object("P1", "Creator One", 5));
        ledger.push_event(envelope(
            "ProfileCreated",
            0,
            json!({ "profile_id": "P1" }),
        ));

        ledger.fail_next_query();
        let report = synchronizer.sync().await;
        // One failed type; the other three types queried fine.
        assert_eq!(report.errors.len(), 1);
        assert_eq!(store.load_cursor("ProfileCreated").await.unwrap(), None);

        // Next pass picks the page up.
        let report = synchronizer.sync().await;
        assert_eq!(report.processed, 1);
        assert!(store.load_cursor("ProfileCreated").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_object_resolution_failure_is_per_event() {
        let (ledger, store, synchronizer) = fixture();
        // No object for P1: resolution fails, event is skipped.
        ledger.push_event(envelope(
            "ProfileCreated",
            0,
            json!({ "profile_id": "P1" }),
        ));

        let report = synchronizer.sync().await;
        assert_eq!(report.processed, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(store.get_creator("P1").await.unwrap().is_none());
        assert_eq!(store.skipped_events().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_updated_patches_without_touching_counters() {
        let (ledger, store, synchronizer) = fixture();
        ledger.put_object(profile_object("P1", "Old Name", 5));
        ledger.push_event(envelope(
            "ProfileCreated",
            0,
            json!({ "profile_id": "P1" }),
        ));
        ledger.push_event(envelope(
            "AccessPurchased",
            1,
            json!({
                "purchase_id": "A1",
                "profile_id": "P1",
                "buyer": "0xABC",
                "amount": 5,
            }),
        ));
        synchronizer.sync().await;

        ledger.put_object(profile_object("P1", "New Name", 7));
        ledger.push_event(envelope(
            "ProfileUpdated",
            2,
            json!({ "profile_id": "P1" }),
        ));
        synchronizer.sync().await;

        let creator = store.get_creator("P1").await.unwrap().unwrap();
        assert_eq!(creator.name, "New Name");
        assert_eq!(creator.price, 7);
        assert_eq!(creator.total_supporters, 1);
    }

    #[tokio::test]
    async fn test_interleaved_syncs_match_sequential() {
        let (ledger, store, synchronizer) = fixture();
        ledger.put_object(profile_object("P1", "Creator One", 5));
        for i in 0..4 {
            ledger.push_event(envelope(
                "AccessPurchased",
                i,
                json!({
                    "purchase_id": format!("A{i}"),
                    "profile_id": "P1",
                    "buyer": "0xABC",
                    "amount": 5,
                }),
            ));
        }
        ledger.push_event(envelope(
            "ProfileCreated",
            100,
            json!({ "profile_id": "P1" }),
        ));

        // Two overlapping passes: double-processing is harmless.
        let (r1, r2) = tokio::join!(synchronizer.sync(), synchronizer.sync());
        // At least one pass saw the events.
        assert!(r1.processed + r2.processed >= 5);

        let creator = store.get_creator("P1").await.unwrap().unwrap();
        assert_eq!(creator.total_supporters, 4);
        assert_eq!(store.supporters_of("P1").await.unwrap().len(), 4);
    }
}
