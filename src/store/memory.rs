//! In-memory store backend.
//!
//! Process-local fallback for environments without durable storage, and the
//! default backend for tests. Satisfies the exact same contract as the
//! SQLite backend.

use super::{
    CreatorPage, CursorStore, MaterializedStore, PageCursor, SkippedEvent, StoreError, StoreResult,
};
use crate::types::{AccessPurchase, Content, CreatorProfile, ProfilePatch};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct MemoryState {
    creators: HashMap<String, CreatorProfile>,
    /// Keyset index: (created_at_ms, profile_id) -> profile_id.
    creator_order: BTreeMap<(i64, String), String>,
    content: HashMap<String, Content>,
    purchases: HashMap<String, AccessPurchase>,
    /// Purchase ids already counted toward supporter totals.
    counted_purchases: HashSet<String>,
    cursors: HashMap<String, String>,
    skipped: Vec<SkippedEvent>,
}

/// Process-local in-memory backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn load_cursor(&self, event_type: &str) -> StoreResult<Option<String>> {
        let state = self.state.read().unwrap();
        Ok(state.cursors.get(event_type).cloned())
    }

    async fn store_cursor(&self, event_type: &str, token: &str) -> StoreResult<()> {
        let mut state = self.state.write().unwrap();
        state.cursors.insert(event_type.to_string(), token.to_string());
        Ok(())
    }
}

#[async_trait]
impl MaterializedStore for MemoryStore {
    async fn upsert_creator(&self, creator: CreatorProfile) -> StoreResult<()> {
        let mut state = self.state.write().unwrap();
        match state.creators.get(&creator.profile_id).cloned() {
            Some(existing) => {
                // Refresh mutable fields, preserve counters and creation
                // position.
                let updated = CreatorProfile {
                    content_count: existing.content_count,
                    total_supporters: existing.total_supporters,
                    created_at_ms: existing.created_at_ms,
                    ..creator
                };
                state.creators.insert(updated.profile_id.clone(), updated);
            }
            None => {
                // Content/purchase events may land before the profile's
                // create event (types sync independently); back-fill the
                // counters from already-applied rows.
                let content_count = state
                    .content
                    .values()
                    .filter(|c| c.profile_id == creator.profile_id)
                    .count() as u64;
                let total_supporters = state
                    .purchases
                    .values()
                    .filter(|p| p.profile_id == creator.profile_id)
                    .count() as u64;
                let fresh = CreatorProfile {
                    content_count,
                    total_supporters,
                    ..creator
                };
                state.creator_order.insert(
                    (fresh.created_at_ms, fresh.profile_id.clone()),
                    fresh.profile_id.clone(),
                );
                state.creators.insert(fresh.profile_id.clone(), fresh);
            }
        }
        Ok(())
    }

    async fn apply_profile_patch(&self, patch: ProfilePatch) -> StoreResult<()> {
        let mut state = self.state.write().unwrap();
        let creator = state
            .creators
            .get_mut(&patch.profile_id)
            .ok_or_else(|| StoreError::NotFound(patch.profile_id.clone()))?;
        if let Some(name) = patch.name {
            creator.name = name;
        }
        if let Some(bio) = patch.bio {
            creator.bio = bio;
        }
        if let Some(avatar) = patch.avatar_blob_id {
            creator.avatar_blob_id = Some(avatar);
        }
        if let Some(alias) = patch.alias {
            creator.alias = Some(alias);
        }
        if let Some(price) = patch.price {
            creator.price = price;
        }
        Ok(())
    }

    async fn upsert_content(&self, content: Content) -> StoreResult<()> {
        let mut state = self.state.write().unwrap();
        if state.content.contains_key(&content.content_id) {
            return Ok(());
        }
        if let Some(creator) = state.creators.get_mut(&content.profile_id) {
            creator.content_count += 1;
        }
        state.content.insert(content.content_id.clone(), content);
        Ok(())
    }

    async fn add_access_purchase(&self, purchase: AccessPurchase) -> StoreResult<()> {
        let mut state = self.state.write().unwrap();
        if !state.counted_purchases.insert(purchase.purchase_id.clone()) {
            return Ok(());
        }
        if let Some(creator) = state.creators.get_mut(&purchase.profile_id) {
            creator.total_supporters += 1;
        }
        state.purchases.insert(purchase.purchase_id.clone(), purchase);
        Ok(())
    }

    async fn get_creator(&self, profile_id: &str) -> StoreResult<Option<CreatorProfile>> {
        let state = self.state.read().unwrap();
        Ok(state.creators.get(profile_id).cloned())
    }

    async fn list_creators(
        &self,
        limit: usize,
        cursor: Option<PageCursor>,
    ) -> StoreResult<CreatorPage> {
        use std::ops::Bound;

        let state = self.state.read().unwrap();
        // Exclusive lower bound: the page starts strictly after the cursor
        // row. An empty profile_id cannot exist, so the no-cursor bound
        // excludes nothing.
        let start = cursor
            .map(|c| (c.created_at_ms, c.profile_id))
            .unwrap_or((i64::MIN, String::new()));

        let mut items: Vec<CreatorProfile> = Vec::with_capacity(limit);
        let mut has_next_page = false;
        for key in state
            .creator_order
            .range((Bound::Excluded(start), Bound::Unbounded))
            .map(|(k, _)| k)
        {
            if items.len() == limit {
                has_next_page = true;
                break;
            }
            // creator_order keys always reference existing rows
            if let Some(creator) = state.creators.get(&key.1) {
                items.push(creator.clone());
            }
        }

        let next_cursor = if has_next_page {
            items.last().map(|c| PageCursor {
                created_at_ms: c.created_at_ms,
                profile_id: c.profile_id.clone(),
            })
        } else {
            None
        };

        Ok(CreatorPage {
            items,
            next_cursor,
            has_next_page,
        })
    }

    async fn content_by_profile(&self, profile_id: &str) -> StoreResult<Vec<Content>> {
        let state = self.state.read().unwrap();
        let mut rows: Vec<Content> = state
            .content
            .values()
            .filter(|c| c.profile_id == profile_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.created_at_ms, &a.content_id).cmp(&(b.created_at_ms, &b.content_id))
        });
        Ok(rows)
    }

    async fn supporters_of(&self, profile_id: &str) -> StoreResult<Vec<AccessPurchase>> {
        let state = self.state.read().unwrap();
        let mut rows: Vec<AccessPurchase> = state
            .purchases
            .values()
            .filter(|p| p.profile_id == profile_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.purchased_at_ms, &a.purchase_id).cmp(&(b.purchased_at_ms, &b.purchase_id))
        });
        Ok(rows)
    }

    async fn record_skipped_event(&self, skipped: SkippedEvent) -> StoreResult<()> {
        let mut state = self.state.write().unwrap();
        state.skipped.push(skipped);
        Ok(())
    }

    async fn skipped_events(&self) -> StoreResult<Vec<SkippedEvent>> {
        let state = self.state.read().unwrap();
        Ok(state.skipped.clone())
    }
}
