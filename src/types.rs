//! Domain model for the creator platform.
//!
//! These are the off-chain materialized shapes of on-ledger objects. The
//! ledger remains the source of truth; every row here must be re-derivable
//! by replaying the event stream from cursor zero.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp in milliseconds.
pub type TimestampMs = i64;

/// A creator's public profile.
///
/// Created on the first `ProfileCreated` event, mutated by `ProfileUpdated`
/// events (absent fields mean "no change"), never deleted.
///
/// Counter invariants:
/// - `content_count` equals the number of [`Content`] rows owned by this profile
/// - `total_supporters` increments exactly once per distinct purchase id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorProfile {
    /// External profile object id (primary key).
    pub profile_id: String,
    /// Owning ledger address.
    pub owner: String,
    /// Display name.
    pub name: String,
    /// Short bio.
    pub bio: String,
    /// Optional avatar blob reference.
    pub avatar_blob_id: Option<String>,
    /// Optional human-readable alias.
    pub alias: Option<String>,
    /// Access price, in the ledger's smallest unit.
    pub price: u64,
    /// Number of content rows owned by this profile.
    pub content_count: u64,
    /// Distinct supporters (monotonically non-decreasing).
    pub total_supporters: u64,
    /// Creation time from the originating event.
    pub created_at_ms: TimestampMs,
}

/// Partial profile update. `None` fields are left unchanged; counters are
/// never touched by a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub profile_id: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar_blob_id: Option<String>,
    pub alias: Option<String>,
    pub price: Option<u64>,
}

/// Content-type tag. Closed union over the known tags, with `Unknown`
/// preserving unrecognized tags for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Audio,
    Unknown(String),
}

impl From<String> for ContentKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "text" => ContentKind::Text,
            "image" => ContentKind::Image,
            "video" => ContentKind::Video,
            "audio" => ContentKind::Audio,
            _ => ContentKind::Unknown(tag),
        }
    }
}

impl From<ContentKind> for String {
    fn from(kind: ContentKind) -> Self {
        kind.as_str().to_string()
    }
}

impl ContentKind {
    /// Canonical tag string.
    pub fn as_str(&self) -> &str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
            ContentKind::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A published content record. Immutable after creation; there are no
/// update or delete events for content in this model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// External content object id (primary key).
    pub content_id: String,
    /// Owning profile id.
    pub profile_id: String,
    pub title: String,
    pub description: String,
    /// Content-addressed blob identifier in the storage network.
    pub blob_id: String,
    pub kind: ContentKind,
    pub created_at_ms: TimestampMs,
}

/// An access grant purchase. Append-only; the purchase id is the
/// idempotency key for supporter counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPurchase {
    /// Access-grant object id (primary key).
    pub purchase_id: String,
    /// Profile the grant applies to.
    pub profile_id: String,
    /// Purchaser's ledger address.
    pub buyer: String,
    /// Amount paid, in the ledger's smallest unit.
    pub amount: u64,
    pub purchased_at_ms: TimestampMs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_known_tags() {
        assert_eq!(ContentKind::from("image".to_string()), ContentKind::Image);
        assert_eq!(ContentKind::Image.as_str(), "image");
    }

    #[test]
    fn test_content_kind_unknown_tag_preserved() {
        let kind = ContentKind::from("hologram".to_string());
        assert_eq!(kind, ContentKind::Unknown("hologram".to_string()));
        assert_eq!(String::from(kind), "hologram");
    }

    #[test]
    fn test_content_kind_serde_roundtrip() {
        let kind: ContentKind = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(kind, ContentKind::Video);
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"video\"");

        let unknown: ContentKind = serde_json::from_str("\"model3d\"").unwrap();
        assert_eq!(unknown, ContentKind::Unknown("model3d".to_string()));
        assert_eq!(serde_json::to_string(&unknown).unwrap(), "\"model3d\"");
    }
}
