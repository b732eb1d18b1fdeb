//! Mock ledger client for testing.

use super::{
    EventCursor, EventEnvelope, EventPage, LedgerClient, LedgerError, LedgerResult, LedgerTx,
    ObjectData, TxReceipt, TxSigner,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock ledger with a scripted event log per event type, an object map, and
/// per-call fault injection.
#[derive(Clone, Default)]
pub struct MockLedgerClient {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Emission-ordered events per event type.
    events: HashMap<String, Vec<EventEnvelope>>,
    objects: HashMap<String, ObjectData>,
    submitted: Vec<LedgerTx>,
    /// When set, the next query_events call fails with a network error.
    fail_next_query: bool,
    /// When set, the next get_object call fails with a network error.
    fail_next_object_read: bool,
    tx_counter: u64,
}

impl MockLedgerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the scripted log (test setup).
    pub fn push_event(&self, envelope: EventEnvelope) {
        let mut state = self.state.lock().unwrap();
        state
            .events
            .entry(envelope.event_type.clone())
            .or_default()
            .push(envelope);
    }

    /// Put an object's committed state (test setup).
    pub fn put_object(&self, object: ObjectData) {
        let mut state = self.state.lock().unwrap();
        state.objects.insert(object.object_id.clone(), object);
    }

    /// Make the next `query_events` call fail transiently.
    pub fn fail_next_query(&self) {
        self.state.lock().unwrap().fail_next_query = true;
    }

    /// Make the next `get_object` call fail transiently.
    pub fn fail_next_object_read(&self) {
        self.state.lock().unwrap().fail_next_object_read = true;
    }

    /// Transactions submitted so far.
    pub fn submitted(&self) -> Vec<LedgerTx> {
        self.state.lock().unwrap().submitted.clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn query_events(
        &self,
        event_type: &str,
        after: Option<&EventCursor>,
        page_size: usize,
    ) -> LedgerResult<EventPage> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_query {
            state.fail_next_query = false;
            return Err(LedgerError::Network("injected query failure".to_string()));
        }

        let log = state.events.get(event_type).cloned().unwrap_or_default();
        let start = match after {
            None => 0,
            Some(cursor) => match log.iter().position(|e| &e.cursor == cursor) {
                Some(i) => i + 1,
                // Unknown cursor: treat as caught up rather than replaying
                // from the start.
                None => log.len(),
            },
        };

        let events: Vec<EventEnvelope> = log.iter().skip(start).take(page_size).cloned().collect();
        let next_cursor = events.last().map(|e| e.cursor.clone());
        Ok(EventPage {
            events,
            next_cursor,
        })
    }

    async fn get_object(&self, object_id: &str) -> LedgerResult<ObjectData> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_object_read {
            state.fail_next_object_read = false;
            return Err(LedgerError::Network("injected object read failure".to_string()));
        }
        state
            .objects
            .get(object_id)
            .cloned()
            .ok_or_else(|| LedgerError::ObjectNotFound(object_id.to_string()))
    }

    async fn multi_get_objects(
        &self,
        object_ids: &[String],
    ) -> LedgerResult<Vec<Option<ObjectData>>> {
        let state = self.state.lock().unwrap();
        Ok(object_ids
            .iter()
            .map(|id| state.objects.get(id).cloned())
            .collect())
    }

    async fn submit(&self, tx: LedgerTx, signer: &dyn TxSigner) -> LedgerResult<TxReceipt> {
        // One signature per submitted transaction.
        let _signature = signer.sign(format!("{tx:?}").as_bytes()).await?;

        let mut state = self.state.lock().unwrap();
        state.submitted.push(tx);
        state.tx_counter += 1;
        Ok(TxReceipt {
            digest: format!("mocktx-{}", state.tx_counter),
        })
    }
}

/// Signer that records how many signatures were requested.
#[derive(Clone, Default)]
pub struct MockSigner {
    signatures: Arc<Mutex<u64>>,
    address: String,
}

impl MockSigner {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            signatures: Arc::new(Mutex::new(0)),
            address: address.into(),
        }
    }

    pub fn signature_count(&self) -> u64 {
        *self.signatures.lock().unwrap()
    }
}

#[async_trait]
impl TxSigner for MockSigner {
    async fn sign(&self, intent: &[u8]) -> LedgerResult<Vec<u8>> {
        *self.signatures.lock().unwrap() += 1;
        // Deterministic fake signature over the intent.
        Ok(intent.iter().rev().copied().collect())
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}
