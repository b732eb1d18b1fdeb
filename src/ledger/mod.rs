//! Trait abstractions for ledger operations.
//!
//! Enables mock implementations for unit testing; the production client is
//! an RPC wrapper satisfying the same trait.

pub mod events;
pub mod mock;
pub mod rpc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque position into an event stream: transaction digest plus the event's
/// sequence number within that transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCursor {
    pub tx_digest: String,
    pub event_seq: u64,
}

impl EventCursor {
    pub fn new(tx_digest: impl Into<String>, event_seq: u64) -> Self {
        Self {
            tx_digest: tx_digest.into(),
            event_seq,
        }
    }

    /// Encode for durable cursor storage.
    pub fn to_token(&self) -> String {
        format!("{}:{}", self.tx_digest, self.event_seq)
    }

    /// Decode a stored token. Returns `None` on a malformed token rather
    /// than guessing a position.
    pub fn from_token(token: &str) -> Option<Self> {
        let (digest, seq) = token.rsplit_once(':')?;
        if digest.is_empty() {
            return None;
        }
        let event_seq = seq.parse().ok()?;
        Some(Self {
            tx_digest: digest.to_string(),
            event_seq,
        })
    }
}

impl fmt::Display for EventCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_digest, self.event_seq)
    }
}

/// An event as emitted by the ledger: position, type name, timestamp, and a
/// structured payload decoded per event type by [`events`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub cursor: EventCursor,
    pub event_type: String,
    pub timestamp_ms: i64,
    pub payload: serde_json::Value,
}

/// One bounded page of events, ascending in emission order.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub events: Vec<EventEnvelope>,
    /// Position to resume from; `None` when the stream end was reached and
    /// no events were returned.
    pub next_cursor: Option<EventCursor>,
}

/// Committed object state read back from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectData {
    pub object_id: String,
    pub fields: serde_json::Value,
}

/// Transactions the core submits to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerTx {
    /// Commit a content record referencing a certified blob.
    PublishContent {
        profile_id: String,
        creator_cap_id: String,
        title: String,
        description: String,
        blob_id: String,
        kind: String,
    },
}

/// Receipt for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub digest: String,
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Page fetch or object read failed; retry on the next pass.
    #[error("transient network error: {0}")]
    Network(String),

    /// Referenced object does not exist on the ledger.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// A required payload field is missing or ill-typed. Raised instead of
    /// silently defaulting.
    #[error("event schema violation in '{event_type}': field '{field}'")]
    SchemaViolation { event_type: String, field: String },

    /// Transaction rejected by the ledger.
    #[error("transaction rejected: {0}")]
    TxRejected(String),

    /// Caller-supplied signing failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

impl LedgerError {
    /// Transient errors leave the cursor untouched; everything else is a
    /// per-event apply problem.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Network(_))
    }
}

/// Caller-supplied signer. Every externally-committed step requires exactly
/// one signature from the owning identity.
#[async_trait]
pub trait TxSigner: Send + Sync {
    /// Sign the given intent bytes.
    async fn sign(&self, intent: &[u8]) -> LedgerResult<Vec<u8>>;

    /// Address of the signing identity.
    fn address(&self) -> String;
}

/// Trait abstraction for the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch the next page of events of one type, ascending, starting after
    /// `after` (`None` = start of stream).
    async fn query_events(
        &self,
        event_type: &str,
        after: Option<&EventCursor>,
        page_size: usize,
    ) -> LedgerResult<EventPage>;

    /// Read one committed object.
    async fn get_object(&self, object_id: &str) -> LedgerResult<ObjectData>;

    /// Read several committed objects. Missing ids yield `None` in place.
    async fn multi_get_objects(&self, object_ids: &[String]) -> LedgerResult<Vec<Option<ObjectData>>>;

    /// Build, sign (via `signer`), and execute a transaction.
    async fn submit(&self, tx: LedgerTx, signer: &dyn TxSigner) -> LedgerResult<TxReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_token_roundtrip() {
        let cursor = EventCursor::new("9xAbC", 7);
        let token = cursor.to_token();
        assert_eq!(token, "9xAbC:7");
        assert_eq!(EventCursor::from_token(&token), Some(cursor));
    }

    #[test]
    fn test_cursor_token_malformed() {
        assert_eq!(EventCursor::from_token("no-separator"), None);
        assert_eq!(EventCursor::from_token("digest:notanumber"), None);
        assert_eq!(EventCursor::from_token(":4"), None);
    }

    #[test]
    fn test_ledger_error_transience() {
        assert!(LedgerError::Network("timeout".to_string()).is_transient());
        assert!(!LedgerError::SchemaViolation {
            event_type: "ProfileCreated".to_string(),
            field: "profile_id".to_string(),
        }
        .is_transient());
        assert!(!LedgerError::ObjectNotFound("0x1".to_string()).is_transient());
    }
}
