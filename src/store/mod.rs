//! Materialized store: the off-chain queryable reconstruction of ledger
//! state.
//!
//! Two interchangeable backends satisfy the same contract: a durable
//! SQLite backend ([`sqlite::SqliteStore`]) and a process-local in-memory
//! backend ([`memory::MemoryStore`]) for environments without durable
//! storage. The ledger stays the source of truth: every table must be
//! re-derivable by replaying events from cursor zero, so every write here
//! is an idempotent upsert keyed by the external object id.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::types::{AccessPurchase, Content, CreatorProfile, ProfilePatch};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid pagination cursor")]
    InvalidCursor,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Keyset pagination cursor: position after `(created_at_ms, profile_id)`.
///
/// Keyset rather than offset so concurrent inserts never shift or duplicate
/// page results for an in-flight enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub created_at_ms: i64,
    pub profile_id: String,
}

impl PageCursor {
    /// Encode as an opaque token for the REST surface.
    pub fn to_token(&self) -> String {
        hex::encode(format!("{}:{}", self.created_at_ms, self.profile_id))
    }

    /// Decode a client-supplied token.
    pub fn from_token(token: &str) -> StoreResult<Self> {
        let raw = hex::decode(token).map_err(|_| StoreError::InvalidCursor)?;
        let raw = String::from_utf8(raw).map_err(|_| StoreError::InvalidCursor)?;
        let (ts, id) = raw.split_once(':').ok_or(StoreError::InvalidCursor)?;
        if id.is_empty() {
            return Err(StoreError::InvalidCursor);
        }
        Ok(Self {
            created_at_ms: ts.parse().map_err(|_| StoreError::InvalidCursor)?,
            profile_id: id.to_string(),
        })
    }
}

/// One page of creators in `(created_at_ms, profile_id)` order.
#[derive(Debug, Clone, Default)]
pub struct CreatorPage {
    pub items: Vec<CreatorProfile>,
    pub next_cursor: Option<PageCursor>,
    pub has_next_page: bool,
}

/// Durable record of an event the synchronizer skipped, kept for operator
/// visibility instead of only an ephemeral error list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEvent {
    pub event_type: String,
    pub cursor_token: String,
    pub reason: String,
    pub skipped_at_ms: i64,
}

/// Durable key-value store of "last processed position" per event type.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Stored cursor token for an event type; `None` means start of stream.
    async fn load_cursor(&self, event_type: &str) -> StoreResult<Option<String>>;

    /// Persist the cursor. Must only be called after the page it covers has
    /// been durably applied.
    async fn store_cursor(&self, event_type: &str, token: &str) -> StoreResult<()>;
}

/// Materialized tables for creators, content, and access purchases.
///
/// All mutations are idempotent by primary key; re-applying an event is a
/// no-op, which is what makes cursor replay and concurrent synchronizer
/// invocations safe.
#[async_trait]
pub trait MaterializedStore: CursorStore {
    /// Insert a creator row or refresh its mutable fields. Counters
    /// (`content_count`, `total_supporters`) are preserved on conflict;
    /// they are owned by content/purchase application.
    async fn upsert_creator(&self, creator: CreatorProfile) -> StoreResult<()>;

    /// Partial update; `None` fields are unchanged. Unknown profile is an
    /// error (updates never create rows).
    async fn apply_profile_patch(&self, patch: ProfilePatch) -> StoreResult<()>;

    /// Insert a content row if absent; bumps the owner's `content_count`
    /// only when the row is new.
    async fn upsert_content(&self, content: Content) -> StoreResult<()>;

    /// Record a purchase; bumps the owner's `total_supporters` exactly once
    /// per distinct purchase id, even under duplicate delivery.
    async fn add_access_purchase(&self, purchase: AccessPurchase) -> StoreResult<()>;

    async fn get_creator(&self, profile_id: &str) -> StoreResult<Option<CreatorProfile>>;

    /// Keyset-paginated enumeration in `(created_at_ms, profile_id)` order.
    async fn list_creators(
        &self,
        limit: usize,
        cursor: Option<PageCursor>,
    ) -> StoreResult<CreatorPage>;

    /// All content owned by a profile, oldest first.
    async fn content_by_profile(&self, profile_id: &str) -> StoreResult<Vec<Content>>;

    /// All purchases for a profile, oldest first.
    async fn supporters_of(&self, profile_id: &str) -> StoreResult<Vec<AccessPurchase>>;

    /// Persist a poison-event record for operator visibility.
    async fn record_skipped_event(&self, skipped: SkippedEvent) -> StoreResult<()>;

    /// All skipped-event records, oldest first.
    async fn skipped_events(&self) -> StoreResult<Vec<SkippedEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_cursor_token_roundtrip() {
        let cursor = PageCursor {
            created_at_ms: 1_700_000_000_123,
            profile_id: "0xP1".to_string(),
        };
        let token = cursor.to_token();
        assert_eq!(PageCursor::from_token(&token).unwrap(), cursor);
    }

    #[test]
    fn test_page_cursor_rejects_garbage() {
        assert!(matches!(
            PageCursor::from_token("not-hex!"),
            Err(StoreError::InvalidCursor)
        ));
        // Valid hex, malformed contents.
        assert!(matches!(
            PageCursor::from_token(&hex::encode("nocolon")),
            Err(StoreError::InvalidCursor)
        ));
        assert!(matches!(
            PageCursor::from_token(&hex::encode("123:")),
            Err(StoreError::InvalidCursor)
        ));
    }

    #[test]
    fn test_page_cursor_negative_timestamp() {
        let token = hex::encode("-5:0xP");
        let cursor = PageCursor::from_token(&token).unwrap();
        assert_eq!(cursor.created_at_ms, -5);
    }
}
