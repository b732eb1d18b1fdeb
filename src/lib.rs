//! Patronage - creator subscription service backend
//!
//! Mirrors a ledger's creator/content/purchase event log into a local
//! materialized store, publishes creator content to a decentralized blob
//! network through a resumable pipeline, gates supporter-only content with
//! identity-based encryption, and serves the result over a small REST
//! surface.
//!
//! The ledger is the source of truth; everything in the store is derived
//! and can be rebuilt by replaying the event log.

pub mod api;
pub mod blob;
pub mod crypto;
pub mod ledger;
pub mod publish;
pub mod store;
pub mod sync;
pub mod types;
