//! Versioned schema mapping for tracked event payloads.
//!
//! Each tracked event type has an explicit decode function that fails loudly
//! with [`LedgerError::SchemaViolation`] when a required field is missing or
//! ill-typed. Nothing here silently defaults to zero.

use super::{EventEnvelope, LedgerError, LedgerResult};
use crate::types::{AccessPurchase, Content, ContentKind};
use serde_json::Value;

/// Event type names as emitted by the ledger package.
pub const PROFILE_CREATED: &str = "ProfileCreated";
pub const PROFILE_UPDATED: &str = "ProfileUpdated";
pub const CONTENT_PUBLISHED: &str = "ContentPublished";
pub const ACCESS_PURCHASED: &str = "AccessPurchased";

/// All event types the synchronizer tracks, in no particular order (each
/// type's cursor advances independently).
pub const TRACKED_EVENT_TYPES: &[&str] = &[
    PROFILE_CREATED,
    PROFILE_UPDATED,
    CONTENT_PUBLISHED,
    ACCESS_PURCHASED,
];

/// Decoded payload of a tracked event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A new profile object was created. Full fields are resolved from the
    /// object itself, not the event.
    ProfileCreated { profile_id: String },
    /// An existing profile changed. Only the id is carried; current fields
    /// are resolved via an object read.
    ProfileUpdated { profile_id: String },
    ContentPublished(Content),
    AccessPurchased(AccessPurchase),
}

/// Decode one envelope according to its event type's schema.
pub fn decode(envelope: &EventEnvelope) -> LedgerResult<EventKind> {
    match envelope.event_type.as_str() {
        PROFILE_CREATED => Ok(EventKind::ProfileCreated {
            profile_id: require_str(envelope, "profile_id")?,
        }),
        PROFILE_UPDATED => Ok(EventKind::ProfileUpdated {
            profile_id: require_str(envelope, "profile_id")?,
        }),
        CONTENT_PUBLISHED => Ok(EventKind::ContentPublished(Content {
            content_id: require_str(envelope, "content_id")?,
            profile_id: require_str(envelope, "profile_id")?,
            title: require_str(envelope, "title")?,
            description: require_str(envelope, "description")?,
            blob_id: require_str(envelope, "blob_id")?,
            kind: ContentKind::from(require_str(envelope, "kind")?),
            created_at_ms: envelope.timestamp_ms,
        })),
        ACCESS_PURCHASED => Ok(EventKind::AccessPurchased(AccessPurchase {
            purchase_id: require_str(envelope, "purchase_id")?,
            profile_id: require_str(envelope, "profile_id")?,
            buyer: require_str(envelope, "buyer")?,
            amount: require_u64(envelope, "amount")?,
            purchased_at_ms: envelope.timestamp_ms,
        })),
        other => Err(LedgerError::SchemaViolation {
            event_type: other.to_string(),
            field: "<unrecognized event type>".to_string(),
        }),
    }
}

fn field<'a>(envelope: &'a EventEnvelope, name: &str) -> LedgerResult<&'a Value> {
    envelope
        .payload
        .get(name)
        .ok_or_else(|| LedgerError::SchemaViolation {
            event_type: envelope.event_type.clone(),
            field: name.to_string(),
        })
}

fn require_str(envelope: &EventEnvelope, name: &str) -> LedgerResult<String> {
    field(envelope, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LedgerError::SchemaViolation {
            event_type: envelope.event_type.clone(),
            field: name.to_string(),
        })
}

fn require_u64(envelope: &EventEnvelope, name: &str) -> LedgerResult<u64> {
    let value = field(envelope, name)?;
    // Ledgers commonly emit u64 amounts as decimal strings to avoid JSON
    // number precision loss; accept both encodings.
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| LedgerError::SchemaViolation {
        event_type: envelope.event_type.clone(),
        field: name.to_string(),
    })
}

/// Decode optional string field from object fields (used by object
/// resolution, same fail-loud policy for required fields).
pub fn object_str(fields: &Value, name: &str, object_id: &str) -> LedgerResult<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LedgerError::SchemaViolation {
            event_type: format!("object {object_id}"),
            field: name.to_string(),
        })
}

/// Optional object field; absent or null maps to `None`.
pub fn object_opt_str(fields: &Value, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Required u64 object field, accepting number or decimal-string encoding.
pub fn object_u64(fields: &Value, name: &str, object_id: &str) -> LedgerResult<u64> {
    match fields.get(name) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| LedgerError::SchemaViolation {
        event_type: format!("object {object_id}"),
        field: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::EventCursor;
    use serde_json::json;

    fn envelope(event_type: &str, payload: Value) -> EventEnvelope {
        EventEnvelope {
            cursor: EventCursor::new("digest", 0),
            event_type: event_type.to_string(),
            timestamp_ms: 1_700_000_000_000,
            payload,
        }
    }

    #[test]
    fn test_decode_profile_created() {
        let env = envelope(PROFILE_CREATED, json!({ "profile_id": "0xP1" }));
        assert_eq!(
            decode(&env).unwrap(),
            EventKind::ProfileCreated {
                profile_id: "0xP1".to_string()
            }
        );
    }

    #[test]
    fn test_decode_content_published() {
        let env = envelope(
            CONTENT_PUBLISHED,
            json!({
                "content_id": "0xC1",
                "profile_id": "0xP1",
                "title": "First post",
                "description": "hello",
                "blob_id": "B1",
                "kind": "image",
            }),
        );
        match decode(&env).unwrap() {
            EventKind::ContentPublished(content) => {
                assert_eq!(content.content_id, "0xC1");
                assert_eq!(content.kind, ContentKind::Image);
                assert_eq!(content.created_at_ms, 1_700_000_000_000);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_decode_access_purchased_string_amount() {
        let env = envelope(
            ACCESS_PURCHASED,
            json!({
                "purchase_id": "0xA1",
                "profile_id": "0xP1",
                "buyer": "0xABC",
                "amount": "5",
            }),
        );
        match decode(&env).unwrap() {
            EventKind::AccessPurchased(purchase) => assert_eq!(purchase.amount, 5),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_decode_missing_field_fails_loudly() {
        let env = envelope(ACCESS_PURCHASED, json!({ "purchase_id": "0xA1" }));
        let err = decode(&env).unwrap_err();
        assert_eq!(
            err,
            LedgerError::SchemaViolation {
                event_type: ACCESS_PURCHASED.to_string(),
                field: "profile_id".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_ill_typed_field_fails_loudly() {
        let env = envelope(
            ACCESS_PURCHASED,
            json!({
                "purchase_id": "0xA1",
                "profile_id": "0xP1",
                "buyer": "0xABC",
                "amount": true,
            }),
        );
        assert!(matches!(
            decode(&env),
            Err(LedgerError::SchemaViolation { field, .. }) if field == "amount"
        ));
    }

    #[test]
    fn test_decode_unrecognized_event_type() {
        let env = envelope("ProfileDeleted", json!({}));
        assert!(matches!(
            decode(&env),
            Err(LedgerError::SchemaViolation { event_type, .. }) if event_type == "ProfileDeleted"
        ));
    }
}
