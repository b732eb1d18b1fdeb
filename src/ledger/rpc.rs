//! JSON-RPC ledger client.
//!
//! Thin wrapper over the ledger node's HTTP endpoint; all network and
//! decode failures map to [`LedgerError::Network`] so the synchronizer
//! treats them as transient.

use super::{
    EventCursor, EventEnvelope, EventPage, LedgerClient, LedgerError, LedgerResult, LedgerTx,
    ObjectData, TxReceipt, TxSigner,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

/// Ledger client speaking JSON-RPC 2.0 over HTTP.
#[derive(Clone)]
pub struct JsonRpcLedgerClient {
    http: reqwest::Client,
    url: String,
}

impl JsonRpcLedgerClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> LedgerResult<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!(method, "ledger rpc call");
        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Network(format!("{method}: {e}")))?;
        let envelope: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Network(format!("{method}: {e}")))?;
        if let Some(error) = envelope.get("error") {
            return Err(LedgerError::Network(format!("{method}: {error}")));
        }
        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| LedgerError::Network(format!("{method}: missing result")))
    }
}

fn parse_cursor(value: &Value) -> Option<EventCursor> {
    Some(EventCursor {
        tx_digest: value.get("txDigest")?.as_str()?.to_string(),
        event_seq: value.get("eventSeq")?.as_str()?.parse().ok()?,
    })
}

fn cursor_json(cursor: &EventCursor) -> Value {
    json!({
        "txDigest": cursor.tx_digest,
        "eventSeq": cursor.event_seq.to_string(),
    })
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn query_events(
        &self,
        event_type: &str,
        after: Option<&EventCursor>,
        page_size: usize,
    ) -> LedgerResult<EventPage> {
        let result = self
            .call(
                "queryEvents",
                json!([
                    { "MoveEventType": event_type },
                    after.map(cursor_json),
                    page_size,
                    false,
                ]),
            )
            .await?;

        let raw_events = result
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut events = Vec::with_capacity(raw_events.len());
        for raw in &raw_events {
            let cursor = raw
                .get("id")
                .and_then(parse_cursor)
                .ok_or_else(|| LedgerError::Network("event missing position".to_string()))?;
            let timestamp_ms = raw
                .get("timestampMs")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            events.push(EventEnvelope {
                cursor,
                event_type: event_type.to_string(),
                timestamp_ms,
                payload: raw.get("parsedJson").cloned().unwrap_or(Value::Null),
            });
        }
        let next_cursor = result.get("nextCursor").and_then(parse_cursor);
        Ok(EventPage {
            events,
            next_cursor,
        })
    }

    async fn get_object(&self, object_id: &str) -> LedgerResult<ObjectData> {
        let result = self
            .call(
                "getObject",
                json!([object_id, { "showContent": true }]),
            )
            .await?;
        let fields = result
            .pointer("/data/content/fields")
            .cloned()
            .ok_or_else(|| LedgerError::ObjectNotFound(object_id.to_string()))?;
        Ok(ObjectData {
            object_id: object_id.to_string(),
            fields,
        })
    }

    async fn multi_get_objects(
        &self,
        object_ids: &[String],
    ) -> LedgerResult<Vec<Option<ObjectData>>> {
        let result = self
            .call(
                "multiGetObjects",
                json!([object_ids, { "showContent": true }]),
            )
            .await?;
        let rows = result.as_array().cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .zip(object_ids)
            .map(|(raw, id)| {
                raw.pointer("/data/content/fields").cloned().map(|fields| ObjectData {
                    object_id: id.clone(),
                    fields,
                })
            })
            .collect())
    }

    async fn submit(&self, tx: LedgerTx, signer: &dyn TxSigner) -> LedgerResult<TxReceipt> {
        let tx_json = match &tx {
            LedgerTx::PublishContent {
                profile_id,
                creator_cap_id,
                title,
                description,
                blob_id,
                kind,
            } => json!({
                "kind": "publishContent",
                "profileId": profile_id,
                "creatorCapId": creator_cap_id,
                "title": title,
                "description": description,
                "blobId": blob_id,
                "contentKind": kind,
            }),
        };
        let intent = serde_json::to_vec(&tx_json)
            .map_err(|e| LedgerError::Network(format!("tx encode: {e}")))?;
        let signature = signer.sign(&intent).await?;

        let result = self
            .call(
                "executeTransaction",
                json!([tx_json, hex::encode(signature), signer.address()]),
            )
            .await?;
        let digest = result
            .get("digest")
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::TxRejected("missing digest".to_string()))?;
        Ok(TxReceipt {
            digest: digest.to_string(),
        })
    }
}
