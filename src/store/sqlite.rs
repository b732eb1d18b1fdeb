//! Durable store backend on SQLite via sqlx.
//!
//! Idempotency is enforced in SQL: upserts use `ON CONFLICT`, and counter
//! bumps only fire when `rows_affected` reports an actual insert, so
//! replaying a page of events is a no-op.

use super::{
    CreatorPage, CursorStore, MaterializedStore, PageCursor, SkippedEvent, StoreError, StoreResult,
};
use crate::types::{AccessPurchase, Content, ContentKind, CreatorProfile, ProfilePatch};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

/// Durable SQLite backend.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database file and initialize the schema.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open a private in-memory database (single connection, used by tests).
    pub async fn open_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS creators (
                profile_id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                bio TEXT NOT NULL,
                avatar_blob_id TEXT,
                alias TEXT,
                price INTEGER NOT NULL,
                content_count INTEGER NOT NULL DEFAULT 0,
                total_supporters INTEGER NOT NULL DEFAULT 0,
                created_at_ms INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_creators_keyset
             ON creators(created_at_ms, profile_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            // No foreign key on profile_id: event types sync independently,
            // so content can land before its profile's create event.
            "CREATE TABLE IF NOT EXISTS content (
                content_id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                blob_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_content_profile ON content(profile_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS access_purchases (
                purchase_id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL,
                buyer TEXT NOT NULL,
                amount INTEGER NOT NULL,
                purchased_at_ms INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_purchases_profile
             ON access_purchases(profile_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cursors (
                event_type TEXT PRIMARY KEY,
                token TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS skipped_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                cursor_token TEXT NOT NULL,
                reason TEXT NOT NULL,
                skipped_at_ms INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_creator(row: &SqliteRow) -> StoreResult<CreatorProfile> {
    Ok(CreatorProfile {
        profile_id: row.try_get("profile_id")?,
        owner: row.try_get("owner")?,
        name: row.try_get("name")?,
        bio: row.try_get("bio")?,
        avatar_blob_id: row.try_get("avatar_blob_id")?,
        alias: row.try_get("alias")?,
        price: row.try_get::<i64, _>("price")? as u64,
        content_count: row.try_get::<i64, _>("content_count")? as u64,
        total_supporters: row.try_get::<i64, _>("total_supporters")? as u64,
        created_at_ms: row.try_get("created_at_ms")?,
    })
}

fn row_to_content(row: &SqliteRow) -> StoreResult<Content> {
    Ok(Content {
        content_id: row.try_get("content_id")?,
        profile_id: row.try_get("profile_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        blob_id: row.try_get("blob_id")?,
        kind: ContentKind::from(row.try_get::<String, _>("kind")?),
        created_at_ms: row.try_get("created_at_ms")?,
    })
}

fn row_to_purchase(row: &SqliteRow) -> StoreResult<AccessPurchase> {
    Ok(AccessPurchase {
        purchase_id: row.try_get("purchase_id")?,
        profile_id: row.try_get("profile_id")?,
        buyer: row.try_get("buyer")?,
        amount: row.try_get::<i64, _>("amount")? as u64,
        purchased_at_ms: row.try_get("purchased_at_ms")?,
    })
}

#[async_trait]
impl CursorStore for SqliteStore {
    async fn load_cursor(&self, event_type: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT token FROM cursors WHERE event_type = ?1")
            .bind(event_type)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("token")?),
            None => None,
        })
    }

    async fn store_cursor(&self, event_type: &str, token: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO cursors (event_type, token) VALUES (?1, ?2)
             ON CONFLICT(event_type) DO UPDATE SET token = excluded.token",
        )
        .bind(event_type)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MaterializedStore for SqliteStore {
    async fn upsert_creator(&self, creator: CreatorProfile) -> StoreResult<()> {
        // Counters and created_at_ms are absent from the conflict clause:
        // they belong to content/purchase application. On a fresh insert the
        // counters back-fill from already-applied rows, since content or
        // purchase events may land before the profile's create event.
        sqlx::query(
            "INSERT INTO creators
               (profile_id, owner, name, bio, avatar_blob_id, alias, price,
                content_count, total_supporters, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                     (SELECT COUNT(*) FROM content WHERE profile_id = ?1),
                     (SELECT COUNT(*) FROM access_purchases WHERE profile_id = ?1),
                     ?8)
             ON CONFLICT(profile_id) DO UPDATE SET
               owner = excluded.owner,
               name = excluded.name,
               bio = excluded.bio,
               avatar_blob_id = excluded.avatar_blob_id,
               alias = excluded.alias,
               price = excluded.price",
        )
        .bind(&creator.profile_id)
        .bind(&creator.owner)
        .bind(&creator.name)
        .bind(&creator.bio)
        .bind(&creator.avatar_blob_id)
        .bind(&creator.alias)
        .bind(creator.price as i64)
        .bind(creator.created_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn apply_profile_patch(&self, patch: ProfilePatch) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE creators SET
               name = COALESCE(?2, name),
               bio = COALESCE(?3, bio),
               avatar_blob_id = COALESCE(?4, avatar_blob_id),
               alias = COALESCE(?5, alias),
               price = COALESCE(?6, price)
             WHERE profile_id = ?1",
        )
        .bind(&patch.profile_id)
        .bind(&patch.name)
        .bind(&patch.bio)
        .bind(&patch.avatar_blob_id)
        .bind(&patch.alias)
        .bind(patch.price.map(|p| p as i64))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(patch.profile_id));
        }
        Ok(())
    }

    async fn upsert_content(&self, content: Content) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO content
               (content_id, profile_id, title, description, blob_id, kind, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&content.content_id)
        .bind(&content.profile_id)
        .bind(&content.title)
        .bind(&content.description)
        .bind(&content.blob_id)
        .bind(content.kind.as_str())
        .bind(content.created_at_ms)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 1 {
            sqlx::query(
                "UPDATE creators SET content_count = content_count + 1
                 WHERE profile_id = ?1",
            )
            .bind(&content.profile_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn add_access_purchase(&self, purchase: AccessPurchase) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO access_purchases
               (purchase_id, profile_id, buyer, amount, purchased_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&purchase.purchase_id)
        .bind(&purchase.profile_id)
        .bind(&purchase.buyer)
        .bind(purchase.amount as i64)
        .bind(purchase.purchased_at_ms)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 1 {
            sqlx::query(
                "UPDATE creators SET total_supporters = total_supporters + 1
                 WHERE profile_id = ?1",
            )
            .bind(&purchase.profile_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_creator(&self, profile_id: &str) -> StoreResult<Option<CreatorProfile>> {
        let row = sqlx::query("SELECT * FROM creators WHERE profile_id = ?1")
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_creator).transpose()
    }

    async fn list_creators(
        &self,
        limit: usize,
        cursor: Option<PageCursor>,
    ) -> StoreResult<CreatorPage> {
        // Fetch limit+1 rows to learn whether another page exists.
        let (after_ts, after_id) = cursor
            .map(|c| (c.created_at_ms, c.profile_id))
            .unwrap_or((i64::MIN, String::new()));

        let rows = sqlx::query(
            "SELECT * FROM creators
             WHERE created_at_ms > ?1
                OR (created_at_ms = ?1 AND profile_id > ?2)
             ORDER BY created_at_ms ASC, profile_id ASC
             LIMIT ?3",
        )
        .bind(after_ts)
        .bind(&after_id)
        .bind((limit + 1) as i64)
        .fetch_all(&self.pool)
        .await?;

        let has_next_page = rows.len() > limit;
        let mut items = Vec::with_capacity(limit.min(rows.len()));
        for row in rows.iter().take(limit) {
            items.push(row_to_creator(row)?);
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
        let rows = sqlx::query(
            "SELECT * FROM content WHERE profile_id = ?1
             ORDER BY created_at_ms ASC, content_id ASC",
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_content).collect()
    }

    async fn supporters_of(&self, profile_id: &str) -> StoreResult<Vec<AccessPurchase>> {
        let rows = sqlx::query(
            "SELECT * FROM access_purchases WHERE profile_id = ?1
             ORDER BY purchased_at_ms ASC, purchase_id ASC",
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_purchase).collect()
    }

    async fn record_skipped_event(&self, skipped: SkippedEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO skipped_events (event_type, cursor_token, reason, skipped_at_ms)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&skipped.event_type)
        .bind(&skipped.cursor_token)
        .bind(&skipped.reason)
        .bind(skipped.skipped_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn skipped_events(&self) -> StoreResult<Vec<SkippedEvent>> {
        let rows = sqlx::query(
            "SELECT event_type, cursor_token, reason, skipped_at_ms
             FROM skipped_events ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(SkippedEvent {
                    event_type: row.try_get("event_type")?,
                    cursor_token: row.try_get("cursor_token")?,
                    reason: row.try_get("reason")?,
                    skipped_at_ms: row.try_get("skipped_at_ms")?,
                })
            })
            .collect()
    }
}
